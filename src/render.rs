use std::fmt::Write as FmtWrite;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use crate::directory::{Directory, TimeSeries};
use crate::icon::{self, Icon, Rgb, resolve_icon};
use crate::label::{LabelScope, expand_label};
use crate::model::*;
use crate::status::{InfoLine, StatusContext, StatusInfo, aggregate_map};
use crate::utils::escape_xml;

// Char-count text metrics; good enough for box sizing without a font stack.
pub const LABEL_CHAR_WIDTH: f32 = 7.0;
pub const LABEL_LINE_HEIGHT: f32 = 14.0;
const LABEL_FONT_SIZE: f32 = 12.0;
const LABEL_GAP: f32 = 4.0;
const LABEL_PAD_X: f32 = 3.0;

const HALO_PAD: f32 = 10.0;
const RECT_HALO_PAD: f32 = 6.0;
const MARK_LEN: f32 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Point {
        Point { x, y }
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Line appearance after the link-trigger override has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stroke {
    pub color: Rgb,
    pub width: f32,
    pub dash: Dash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dash {
    Solid,
    Dashed,
    Dotted,
}

impl Stroke {
    /// Unparseable colors degrade to black rather than failing the render.
    pub fn from_style(style: &DrawStyle) -> Stroke {
        let color = Rgb::parse(&style.color).unwrap_or(icon::BLACK);
        match style.line {
            LineStyle::Line => Stroke { color, width: 2.0, dash: Dash::Solid },
            LineStyle::Bold => Stroke { color, width: 4.0, dash: Dash::Solid },
            LineStyle::Dashed => Stroke { color, width: 2.0, dash: Dash::Dashed },
            LineStyle::Dotted => Stroke { color, width: 2.0, dash: Dash::Dotted },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Start,
    Middle,
    End,
}

/// The five drawing primitives the pipeline needs, plus the acknowledgement
/// arc. One implementation emits SVG for raster output; the structured
/// [`Scene`] form bypasses this trait entirely.
pub trait Canvas {
    fn line(&mut self, a: Point, b: Point, stroke: Stroke) -> Result<()>;
    fn ellipse(&mut self, center: Point, rx: f32, ry: f32, fill: Rgb, stroke: Option<Rgb>)
    -> Result<()>;
    fn rect(&mut self, origin: Point, w: f32, h: f32, fill: Option<Rgb>, stroke: Option<Stroke>)
    -> Result<()>;
    fn text(&mut self, at: Point, text: &str, color: Rgb, anchor: TextAnchor) -> Result<()>;
    fn image(&mut self, origin: Point, icon: &Icon) -> Result<()>;
    /// Three-quarter arc centered on `center`, open to the right.
    fn arc(&mut self, center: Point, radius: f32, color: Rgb, width: f32) -> Result<()>;
}

/// Severity halo drawn behind an element's icon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Halo {
    Ellipse { fill: Rgb, ack_arc: bool },
    Rect { fill: Rgb },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneElement {
    pub id: ElementId,
    pub kind: ElementKind,
    pub x: f32,
    pub y: f32,
    pub icon: Icon,
    pub icon_type: IconType,
    pub status: StatusKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halo: Option<Halo>,
    /// Contributing data changed within the recency window.
    pub marked: bool,
    pub label_location: LabelLocation,
    pub label: Vec<InfoLine>,
}

impl SceneElement {
    fn center(&self) -> Point {
        Point::new(self.x + self.icon.width / 2.0, self.y + self.icon.height / 2.0)
    }

    /// Extra clearance labels and marks keep from the icon box.
    fn halo_pad(&self) -> f32 {
        match self.halo {
            Some(Halo::Ellipse { .. }) => HALO_PAD,
            Some(Halo::Rect { .. }) => RECT_HALO_PAD,
            None => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneLink {
    pub id: LinkId,
    pub from: Point,
    pub to: Point,
    pub stroke: Stroke,
    pub label: String,
}

/// Structured description of one fully resolved map: every status computed,
/// every icon and style selected, every label expanded. Serializes for a
/// client-side renderer and drives the server-side SVG/PNG output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub map: MapId,
    pub name: String,
    pub width: f32,
    pub height: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<Icon>,
    pub links: Vec<SceneLink>,
    pub elements: Vec<SceneElement>,
}

pub struct MapRenderer<'a> {
    directory: &'a dyn Directory,
    series: &'a dyn TimeSeries,
    ctx: StatusContext<'a>,
}

impl<'a> MapRenderer<'a> {
    pub fn new(directory: &'a dyn Directory, series: &'a dyn TimeSeries, now: i64) -> Self {
        MapRenderer { directory, series, ctx: StatusContext::new(directory, now) }
    }

    pub fn ack_enabled(mut self, on: bool) -> Self {
        self.ctx.ack_enabled = on;
        self
    }

    /// Runs aggregation and resolves everything drawable. Elements whose
    /// underlying object is gone are omitted, along with links touching
    /// them; only a sub-map cycle fails the whole render.
    pub fn scene(&self, map: &MapDef) -> Result<Scene> {
        let statuses = aggregate_map(&self.ctx, map)?;
        debug!(map = map.id, elements = statuses.len(), "aggregated map statuses");

        let mut elements = Vec::with_capacity(statuses.len());
        for element in &map.elements {
            let Some(status) = statuses.get(&element.id) else {
                continue;
            };
            let icon = resolve_icon(self.directory, &element.icons, status.icon_type);
            let halo = if map.highlight {
                resolve_halo(status, self.ctx.ack_enabled)
            } else {
                None
            };
            elements.push(SceneElement {
                id: element.id,
                kind: element.target.kind(),
                x: element.x,
                y: element.y,
                icon,
                icon_type: status.icon_type,
                status: status.status,
                halo,
                marked: status.lately_changed,
                label_location: element.label_location.unwrap_or(map.label_location),
                label: self.label_lines(map, element, status),
            });
        }

        let mut links = Vec::with_capacity(map.links.len());
        for link in &map.links {
            let endpoint = |id| elements.iter().find(|e: &&SceneElement| e.id == id);
            let (Some(from), Some(to)) = (endpoint(link.from), endpoint(link.to)) else {
                warn!(link = link.id, map = map.id, "skipping link with unresolved endpoint");
                continue;
            };
            links.push(SceneLink {
                id: link.id,
                from: from.center(),
                to: to.center(),
                stroke: Stroke::from_style(&self.resolve_link_style(link)),
                label: expand_label(
                    &link.label,
                    &LabelScope::link(),
                    self.directory,
                    self.series,
                    self.ctx.now,
                ),
            });
        }

        Ok(Scene {
            map: map.id,
            name: map.name.clone(),
            width: map.width,
            height: map.height,
            background: (map.background != 0)
                .then(|| self.directory.image(map.background))
                .flatten()
                .map(|image| Icon {
                    id: image.id,
                    name: image.name,
                    width: image.width,
                    height: image.height,
                    data: image.data,
                }),
            links,
            elements,
        })
    }

    pub fn render_svg(&self, map: &MapDef) -> Result<String> {
        self.scene(map)?.to_svg()
    }

    #[cfg(feature = "png")]
    pub fn render_png(&self, map: &MapDef, scale: f32) -> Result<Vec<u8>> {
        self.scene(map)?.to_png(scale)
    }

    /// Highest-priority enabled, firing link trigger overrides the link's
    /// default style. Equal priorities keep the first match in ascending
    /// trigger-id order, so the lowest id wins the tie.
    fn resolve_link_style(&self, link: &Link) -> DrawStyle {
        let mut overrides: Vec<&LinkTrigger> = link.triggers.iter().collect();
        overrides.sort_by_key(|lt| lt.trigger);

        let mut best: Option<(Priority, &DrawStyle)> = None;
        for lt in overrides {
            let Some(trigger) = self.directory.trigger(lt.trigger) else {
                warn!(link = link.id, trigger = lt.trigger, "link references missing trigger");
                continue;
            };
            if !trigger.enabled || !trigger.firing() {
                continue;
            }
            if best.is_none_or(|(p, _)| trigger.priority > p) {
                best = Some((trigger.priority, &lt.style));
            }
        }

        best.map_or_else(|| link.style.clone(), |(_, style)| style.clone())
    }

    fn label_lines(&self, map: &MapDef, element: &Element, status: &StatusInfo) -> Vec<InfoLine> {
        let mut lines = Vec::new();
        let scope = LabelScope::element(element.target, Some(status));

        match map.label_policy {
            LabelPolicy::Nothing => return lines,
            LabelPolicy::Name => {
                lines.push(InfoLine { msg: status.name.clone(), color: icon::BLACK });
                return lines;
            }
            LabelPolicy::Status => {}
            LabelPolicy::Ip => match element.target {
                ElementRef::Host(id) => {
                    if let Some(host) = self.directory.host(id) {
                        lines.push(InfoLine { msg: host.ip, color: icon::BLACK });
                    }
                }
                _ => self.push_expanded(&mut lines, &element.label, &scope),
            },
            LabelPolicy::Label => self.push_expanded(&mut lines, &element.label, &scope),
        }

        lines.extend(status.info.iter().cloned());
        lines
    }

    fn push_expanded(&self, lines: &mut Vec<InfoLine>, label: &str, scope: &LabelScope) {
        let expanded = expand_label(label, scope, self.directory, self.series, self.ctx.now);
        for row in expanded.lines().filter(|row| !row.trim().is_empty()) {
            lines.push(InfoLine { msg: row.to_string(), color: icon::BLACK });
        }
    }
}

/// Ellipse for severity, rectangle for disabled/maintenance/unavailable.
/// When both would apply, host groups and sub-maps keep the rectangle and
/// everything else keeps the ellipse.
fn resolve_halo(status: &StatusInfo, ack_enabled: bool) -> Option<Halo> {
    if status.kind == ElementKind::Image {
        return None;
    }

    let ellipse = match status.icon_type {
        IconType::On => Some(icon::halo_color(status.priority)),
        IconType::Unknown => Some(icon::HALO_UNKNOWN),
        _ => None,
    };

    let rect = if status.disabled {
        Some(icon::HALO_DISABLED)
    } else if status.icon_type == IconType::Maintenance {
        Some(icon::HALO_MAINTENANCE)
    } else if status.unavailable {
        Some(icon::HALO_UNAVAILABLE)
    } else {
        None
    };

    let prefer_rect = matches!(status.kind, ElementKind::HostGroup | ElementKind::Map);
    match (ellipse, rect) {
        (Some(_), Some(fill)) if prefer_rect => Some(Halo::Rect { fill }),
        (Some(fill), _) => Some(Halo::Ellipse {
            fill,
            ack_arc: ack_enabled && status.problems > 0 && status.ack,
        }),
        (None, Some(fill)) => Some(Halo::Rect { fill }),
        (None, None) => None,
    }
}

fn text_width(text: &str) -> f32 {
    text.chars().count() as f32 * LABEL_CHAR_WIDTH
}

impl Scene {
    /// Draws the scene through a canvas in fixed back-to-front order:
    /// connectors, halos, icons, recency marks, link labels, element labels.
    pub fn paint(&self, canvas: &mut dyn Canvas) -> Result<()> {
        for link in &self.links {
            canvas.line(link.from, link.to, link.stroke)?;
        }

        for element in &self.elements {
            let center = element.center();
            match element.halo {
                Some(Halo::Ellipse { fill, ack_arc }) => {
                    let rx = element.icon.width / 2.0 + HALO_PAD;
                    let ry = element.icon.height / 2.0 + HALO_PAD;
                    canvas.ellipse(center, rx, ry, fill, None)?;
                    if ack_arc {
                        canvas.arc(center, rx.min(ry) - 4.0, icon::ACK_ARC, 3.0)?;
                    }
                }
                Some(Halo::Rect { fill }) => {
                    let origin = Point::new(element.x - RECT_HALO_PAD, element.y - RECT_HALO_PAD);
                    let w = element.icon.width + 2.0 * RECT_HALO_PAD;
                    let h = element.icon.height + 2.0 * RECT_HALO_PAD;
                    // Double border: shadow line outside the main one.
                    canvas.rect(
                        Point::new(origin.x - 2.0, origin.y - 2.0),
                        w + 4.0,
                        h + 4.0,
                        None,
                        Some(Stroke { color: icon::HALO_SHADOW, width: 1.0, dash: Dash::Solid }),
                    )?;
                    canvas.rect(
                        origin,
                        w,
                        h,
                        Some(fill),
                        Some(Stroke { color: icon::HALO_BORDER, width: 1.0, dash: Dash::Solid }),
                    )?;
                }
                None => {}
            }
        }

        for element in &self.elements {
            canvas.image(Point::new(element.x, element.y), &element.icon)?;
        }

        for element in &self.elements {
            if element.marked {
                self.paint_marks(canvas, element)?;
            }
        }

        for link in &self.links {
            self.paint_link_label(canvas, link)?;
        }

        for element in &self.elements {
            self.paint_element_label(canvas, element)?;
        }

        Ok(())
    }

    /// Tick marks on the three sides away from the label, so they never sit
    /// under the text; all four sides when the element draws no label.
    fn paint_marks(&self, canvas: &mut dyn Canvas, element: &SceneElement) -> Result<()> {
        let pad = element.halo_pad().max(2.0);
        let len = if element.halo.is_some() { MARK_LEN * 1.5 } else { MARK_LEN };
        let center = element.center();
        let left = element.x - pad;
        let right = element.x + element.icon.width + pad;
        let top = element.y - pad;
        let bottom = element.y + element.icon.height + pad;

        let stroke = Stroke { color: icon::RED, width: 2.0, dash: Dash::Solid };
        let mut tick = |side: LabelLocation| -> Result<()> {
            let (a, b) = match side {
                LabelLocation::Top => {
                    (Point::new(center.x, top), Point::new(center.x, top - len))
                }
                LabelLocation::Bottom => {
                    (Point::new(center.x, bottom), Point::new(center.x, bottom + len))
                }
                LabelLocation::Left => {
                    (Point::new(left, center.y), Point::new(left - len, center.y))
                }
                LabelLocation::Right => {
                    (Point::new(right, center.y), Point::new(right + len, center.y))
                }
            };
            canvas.line(a, b, stroke)
        };

        for side in [
            LabelLocation::Top,
            LabelLocation::Bottom,
            LabelLocation::Left,
            LabelLocation::Right,
        ] {
            if element.label.is_empty() || side != element.label_location {
                tick(side)?;
            }
        }
        Ok(())
    }

    fn paint_link_label(&self, canvas: &mut dyn Canvas, link: &SceneLink) -> Result<()> {
        let rows: Vec<&str> = link.label.lines().filter(|row| !row.trim().is_empty()).collect();
        if rows.is_empty() {
            return Ok(());
        }

        let widest = rows.iter().map(|row| text_width(row)).fold(0.0, f32::max);
        let w = widest + 2.0 * LABEL_PAD_X;
        let h = rows.len() as f32 * LABEL_LINE_HEIGHT + 2.0;
        let center = link.from.midpoint(link.to);

        // Box border mirrors the connector's style.
        let border = Stroke { width: 1.0, ..link.stroke };
        canvas.rect(
            Point::new(center.x - w / 2.0, center.y - h / 2.0),
            w,
            h,
            Some(icon::WHITE),
            Some(border),
        )?;

        let mut y = center.y - h / 2.0 + 1.0 + LABEL_LINE_HEIGHT / 2.0;
        for row in rows {
            canvas.text(Point::new(center.x, y), row, icon::BLACK, TextAnchor::Middle)?;
            y += LABEL_LINE_HEIGHT;
        }
        Ok(())
    }

    fn paint_element_label(&self, canvas: &mut dyn Canvas, element: &SceneElement) -> Result<()> {
        if element.label.is_empty() {
            return Ok(());
        }

        let pad = element.halo_pad() + LABEL_GAP;
        let center = element.center();
        let total = element.label.len() as f32 * LABEL_LINE_HEIGHT;
        let half = LABEL_LINE_HEIGHT / 2.0;

        let (anchor, x, mut y) = match element.label_location {
            LabelLocation::Bottom => {
                (TextAnchor::Middle, center.x, element.y + element.icon.height + pad + half)
            }
            LabelLocation::Top => (TextAnchor::Middle, center.x, element.y - pad - total + half),
            LabelLocation::Left => (TextAnchor::End, element.x - pad, center.y - total / 2.0 + half),
            LabelLocation::Right => (
                TextAnchor::Start,
                element.x + element.icon.width + pad,
                center.y - total / 2.0 + half,
            ),
        };

        for line in &element.label {
            let w = text_width(&line.msg) + 2.0 * LABEL_PAD_X;
            let rect_x = match anchor {
                TextAnchor::Middle => x - w / 2.0,
                TextAnchor::Start => x - LABEL_PAD_X,
                TextAnchor::End => x - w + LABEL_PAD_X,
            };
            // Per-line opaque backing keeps text readable over connectors.
            canvas.rect(
                Point::new(rect_x, y - half),
                w,
                LABEL_LINE_HEIGHT,
                Some(icon::WHITE),
                None,
            )?;
            canvas.text(Point::new(x, y), &line.msg, line.color, anchor)?;
            y += LABEL_LINE_HEIGHT;
        }
        Ok(())
    }

    pub fn to_svg(&self) -> Result<String> {
        let mut canvas = SvgCanvas::new(self.width, self.height)?;
        if let Some(background) = &self.background {
            canvas.image(Point::new(0.0, 0.0), background)?;
        }
        self.paint(&mut canvas)?;
        canvas.finish()
    }

    #[cfg(feature = "png")]
    pub fn to_png(&self, scale: f32) -> Result<Vec<u8>> {
        use anyhow::{anyhow, bail};
        use tiny_skia::{Pixmap, Transform};

        if scale <= 0.0 {
            bail!("scale must be greater than zero when rendering PNG output");
        }

        let svg = self.to_svg()?;

        let mut options = resvg::usvg::Options::default();
        options.fontdb_mut().load_system_fonts();

        let tree = resvg::usvg::Tree::from_str(&svg, &options)
            .map_err(|err| anyhow!("failed to parse generated SVG for PNG export: {err}"))?;

        let size = tree.size().to_int_size();
        let scaled_width = ((size.width() as f32) * scale).ceil();
        let scaled_height = ((size.height() as f32) * scale).ceil();

        if !scaled_width.is_finite() || !scaled_height.is_finite() {
            bail!("scaled dimensions are not finite; try a smaller scale factor");
        }
        if scaled_width < 1.0 || scaled_height < 1.0 {
            bail!("scaled dimensions collapsed below 1px; try a larger scale factor");
        }
        if scaled_width > u32::MAX as f32 || scaled_height > u32::MAX as f32 {
            bail!("scaled dimensions exceed supported limits; try a smaller scale factor");
        }

        let mut pixmap =
            Pixmap::new(scaled_width as u32, scaled_height as u32).ok_or_else(|| {
                anyhow!("failed to allocate {scaled_width}x{scaled_height} surface for PNG export")
            })?;

        resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

        pixmap
            .encode_png()
            .map_err(|err| anyhow!("failed to encode PNG output: {err}"))
    }
}

/// SVG-emitting [`Canvas`].
pub struct SvgCanvas {
    svg: String,
}

impl SvgCanvas {
    pub fn new(width: f32, height: f32) -> Result<SvgCanvas> {
        let mut svg = String::new();
        write!(
            svg,
            r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{:.0}" height="{:.0}" viewBox="0 0 {:.0} {:.0}" font-family="Inter, system-ui, sans-serif">
  <rect width="100%" height="100%" fill="#ffffff" />
"##,
            width, height, width, height
        )?;
        Ok(SvgCanvas { svg })
    }

    pub fn finish(mut self) -> Result<String> {
        self.svg.push_str("</svg>\n");
        Ok(self.svg)
    }

    fn dash_attr(dash: Dash) -> &'static str {
        match dash {
            Dash::Solid => "",
            Dash::Dashed => " stroke-dasharray=\"8 6\"",
            Dash::Dotted => " stroke-dasharray=\"2 4\"",
        }
    }
}

impl Canvas for SvgCanvas {
    fn line(&mut self, a: Point, b: Point, stroke: Stroke) -> Result<()> {
        write!(
            self.svg,
            "  <line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"#{}\" stroke-width=\"{:.1}\"{} />\n",
            a.x,
            a.y,
            b.x,
            b.y,
            stroke.color.to_hex(),
            stroke.width,
            Self::dash_attr(stroke.dash)
        )?;
        Ok(())
    }

    fn ellipse(
        &mut self,
        center: Point,
        rx: f32,
        ry: f32,
        fill: Rgb,
        stroke: Option<Rgb>,
    ) -> Result<()> {
        let stroke_attr = match stroke {
            Some(color) => format!(" stroke=\"#{}\" stroke-width=\"1\"", color.to_hex()),
            None => String::new(),
        };
        write!(
            self.svg,
            "  <ellipse cx=\"{:.1}\" cy=\"{:.1}\" rx=\"{:.1}\" ry=\"{:.1}\" fill=\"#{}\"{} />\n",
            center.x,
            center.y,
            rx,
            ry,
            fill.to_hex(),
            stroke_attr
        )?;
        Ok(())
    }

    fn rect(
        &mut self,
        origin: Point,
        w: f32,
        h: f32,
        fill: Option<Rgb>,
        stroke: Option<Stroke>,
    ) -> Result<()> {
        let fill_attr = match fill {
            Some(color) => format!("#{}", color.to_hex()),
            None => "none".to_string(),
        };
        let stroke_attr = match stroke {
            Some(s) => format!(
                " stroke=\"#{}\" stroke-width=\"{:.1}\"{}",
                s.color.to_hex(),
                s.width,
                Self::dash_attr(s.dash)
            ),
            None => String::new(),
        };
        write!(
            self.svg,
            "  <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"{}\"{} />\n",
            origin.x, origin.y, w, h, fill_attr, stroke_attr
        )?;
        Ok(())
    }

    fn text(&mut self, at: Point, text: &str, color: Rgb, anchor: TextAnchor) -> Result<()> {
        let anchor = match anchor {
            TextAnchor::Start => "start",
            TextAnchor::Middle => "middle",
            TextAnchor::End => "end",
        };
        write!(
            self.svg,
            "  <text x=\"{:.1}\" y=\"{:.1}\" fill=\"#{}\" font-size=\"{:.0}\" text-anchor=\"{}\" dominant-baseline=\"middle\" xml:space=\"preserve\">{}</text>\n",
            at.x,
            at.y,
            color.to_hex(),
            LABEL_FONT_SIZE,
            anchor,
            escape_xml(text)
        )?;
        Ok(())
    }

    fn image(&mut self, origin: Point, icon: &Icon) -> Result<()> {
        match &icon.data {
            Some(data) => {
                write!(
                    self.svg,
                    "  <image x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" xlink:href=\"data:image/png;base64,{}\" />\n",
                    origin.x, origin.y, icon.width, icon.height, data
                )?;
            }
            None => {
                // No embedded payload; draw a named placeholder box.
                write!(
                    self.svg,
                    "  <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"#f0f0f0\" stroke=\"#787878\" stroke-width=\"1\" />\n",
                    origin.x, origin.y, icon.width, icon.height
                )?;
                write!(
                    self.svg,
                    "  <text x=\"{:.1}\" y=\"{:.1}\" fill=\"#787878\" font-size=\"9\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>\n",
                    origin.x + icon.width / 2.0,
                    origin.y + icon.height / 2.0,
                    escape_xml(&icon.name)
                )?;
            }
        }
        Ok(())
    }

    fn arc(&mut self, center: Point, radius: f32, color: Rgb, width: f32) -> Result<()> {
        // 270 degrees, gap facing right.
        let dx = radius * std::f32::consts::FRAC_1_SQRT_2;
        write!(
            self.svg,
            "  <path d=\"M {:.1} {:.1} A {:.1} {:.1} 0 1 0 {:.1} {:.1}\" fill=\"none\" stroke=\"#{}\" stroke-width=\"{:.1}\" />\n",
            center.x + dx,
            center.y - dx,
            radius,
            radius,
            center.x + dx,
            center.y + dx,
            color.to_hex(),
            width
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{
        Availability, HostRecord, HostStatus, TriggerRecord, World,
    };

    fn host(id: HostId, name: &str) -> HostRecord {
        HostRecord {
            id,
            name: name.to_string(),
            dns: format!("{name}.example.net"),
            ip: "192.0.2.1".to_string(),
            use_ip: false,
            status: HostStatus::Monitored,
            available: Availability::Available,
            maintenance: None,
        }
    }

    fn firing_trigger(id: TriggerId, host: HostId, priority: Priority) -> TriggerRecord {
        TriggerRecord {
            id,
            host,
            description: format!("trigger {id}"),
            priority,
            value: TriggerValue::Problem,
            enabled: true,
            last_change: 0,
            acknowledged: false,
        }
    }

    fn element(id: ElementId, target: ElementRef, x: f32, y: f32) -> Element {
        Element {
            id,
            target,
            x,
            y,
            icons: IconSlots::default(),
            label: String::new(),
            label_location: None,
        }
    }

    fn linked_world() -> (World, MapDef) {
        let map = MapDef {
            id: 1,
            name: "core".to_string(),
            width: 400.0,
            height: 300.0,
            background: 0,
            label_policy: LabelPolicy::Label,
            label_location: LabelLocation::Bottom,
            show_unack: AckFilter::All,
            expand_problem: false,
            highlight: true,
            elements: vec![
                element(10, ElementRef::Host(1), 50.0, 50.0),
                element(11, ElementRef::Host(2), 250.0, 50.0),
            ],
            links: vec![Link {
                id: 1,
                from: 10,
                to: 11,
                style: DrawStyle::default(),
                label: String::new(),
                triggers: vec![
                    LinkTrigger {
                        trigger: 1,
                        style: DrawStyle { line: LineStyle::Bold, color: "DD0000".to_string() },
                    },
                    LinkTrigger {
                        trigger: 2,
                        style: DrawStyle { line: LineStyle::Dashed, color: "00DD00".to_string() },
                    },
                    LinkTrigger {
                        trigger: 3,
                        style: DrawStyle { line: LineStyle::Dotted, color: "0000DD".to_string() },
                    },
                ],
            }],
        };
        let world = World {
            hosts: vec![host(1, "alpha"), host(2, "beta")],
            triggers: vec![
                firing_trigger(1, 1, Priority::Warning),
                firing_trigger(2, 1, Priority::High),
                firing_trigger(3, 1, Priority::Average),
            ],
            maps: vec![map.clone()],
            ..World::default()
        };
        (world, map)
    }

    #[test]
    fn highest_priority_link_trigger_wins_the_style() {
        let (world, map) = linked_world();
        let renderer = MapRenderer::new(&world, &world, 1_000_000);
        let scene = renderer.scene(&map).unwrap();

        assert_eq!(scene.links.len(), 1);
        // Priorities 2, 4, 3: the priority-4 trigger's dashed green style.
        assert_eq!(scene.links[0].stroke.dash, Dash::Dashed);
        assert_eq!(scene.links[0].stroke.color, Rgb::new(0x00, 0xDD, 0x00));
    }

    #[test]
    fn equal_priorities_keep_the_lowest_trigger_id() {
        let (mut world, map) = linked_world();
        for trigger in &mut world.triggers {
            trigger.priority = Priority::Warning;
        }
        let renderer = MapRenderer::new(&world, &world, 1_000_000);
        let scene = renderer.scene(&map).unwrap();
        assert_eq!(scene.links[0].stroke.dash, Dash::Solid);
        assert_eq!(scene.links[0].stroke.color, Rgb::new(0xDD, 0x00, 0x00));
    }

    #[test]
    fn quiet_link_keeps_its_default_style() {
        let (mut world, map) = linked_world();
        for trigger in &mut world.triggers {
            trigger.value = TriggerValue::Ok;
        }
        let renderer = MapRenderer::new(&world, &world, 1_000_000);
        let scene = renderer.scene(&map).unwrap();
        assert_eq!(scene.links[0].stroke.color, icon::BLACK);
        assert_eq!(scene.links[0].stroke.dash, Dash::Solid);
    }

    #[test]
    fn problem_host_gets_a_severity_ellipse() {
        let (world, map) = linked_world();
        let renderer = MapRenderer::new(&world, &world, 1_000_000);
        let scene = renderer.scene(&map).unwrap();

        let alpha = scene.elements.iter().find(|e| e.id == 10).unwrap();
        assert_eq!(alpha.icon_type, IconType::On);
        assert_eq!(
            alpha.halo,
            Some(Halo::Ellipse { fill: icon::halo_color(Priority::High), ack_arc: false })
        );

        let beta = scene.elements.iter().find(|e| e.id == 11).unwrap();
        assert_eq!(beta.icon_type, IconType::Off);
        assert_eq!(beta.halo, None);
    }

    #[test]
    fn disabled_highlight_suppresses_halos() {
        let (world, mut map) = linked_world();
        map.highlight = false;
        let renderer = MapRenderer::new(&world, &world, 1_000_000);
        let scene = renderer.scene(&map).unwrap();
        assert!(scene.elements.iter().all(|e| e.halo.is_none()));
    }

    #[test]
    fn svg_output_contains_connector_and_labels() {
        let (world, map) = linked_world();
        let renderer = MapRenderer::new(&world, &world, 1_000_000);
        let svg = renderer.render_svg(&map).unwrap();

        assert!(svg.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(svg.contains("<svg"));
        assert!(svg.contains("fill=\"#ffffff\""));
        assert!(svg.contains("<line"));
        assert!(svg.contains("3 problems"));
        assert!(svg.contains("OK"));
    }

    #[test]
    fn hidden_labels_free_all_four_mark_sides() {
        let (mut world, mut map) = linked_world();
        for trigger in &mut world.triggers {
            trigger.last_change = 999_990;
        }
        let renderer = MapRenderer::new(&world, &world, 1_000_000);

        // Label drawn at the bottom: ticks on the three remaining sides.
        let svg = renderer.render_svg(&map).unwrap();
        assert_eq!(svg.matches("stroke=\"#FF0000\"").count(), 3);

        map.label_policy = LabelPolicy::Nothing;
        let svg = renderer.render_svg(&map).unwrap();
        assert_eq!(svg.matches("stroke=\"#FF0000\"").count(), 4);
    }

    #[test]
    fn label_lines_follow_the_map_policy() {
        let (world, mut map) = linked_world();
        map.elements[0].label = "{HOSTNAME} uplink".to_string();

        map.label_policy = LabelPolicy::Name;
        let renderer = MapRenderer::new(&world, &world, 1_000_000);
        let scene = renderer.scene(&map).unwrap();
        assert_eq!(scene.elements[0].label, vec![InfoLine {
            msg: "alpha".to_string(),
            color: icon::BLACK
        }]);

        map.label_policy = LabelPolicy::Ip;
        let scene = renderer.scene(&map).unwrap();
        assert_eq!(scene.elements[0].label[0].msg, "192.0.2.1");

        map.label_policy = LabelPolicy::Label;
        let scene = renderer.scene(&map).unwrap();
        assert_eq!(scene.elements[0].label[0].msg, "alpha uplink");
        assert!(scene.elements[0].label.len() > 1);

        map.label_policy = LabelPolicy::Nothing;
        let scene = renderer.scene(&map).unwrap();
        assert!(scene.elements[0].label.is_empty());
    }

    #[test]
    fn scene_is_deterministic_for_unchanged_inputs() {
        let (world, map) = linked_world();
        let renderer = MapRenderer::new(&world, &world, 1_000_000);
        let first = renderer.scene(&map).unwrap();
        let second = renderer.scene(&map).unwrap();
        assert_eq!(first, second);
    }
}
