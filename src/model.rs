use serde::{Deserialize, Serialize};

pub type MapId = u64;
pub type ElementId = u64;
pub type HostId = u64;
pub type GroupId = u64;
pub type TriggerId = u64;
pub type ItemId = u64;
pub type ImageId = u64;
pub type LinkId = u64;
pub type MaintenanceId = u64;

/// A topology map definition: placed elements connected by links, plus the
/// display options that steer status aggregation and label rendering.
/// Owned by configuration storage; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDef {
    pub id: MapId,
    pub name: String,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub background: ImageId,
    #[serde(default)]
    pub label_policy: LabelPolicy,
    #[serde(default)]
    pub label_location: LabelLocation,
    #[serde(default)]
    pub show_unack: AckFilter,
    #[serde(default)]
    pub expand_problem: bool,
    #[serde(default = "default_true")]
    pub highlight: bool,
    pub elements: Vec<Element>,
    #[serde(default)]
    pub links: Vec<Link>,
}

fn default_true() -> bool {
    true
}

impl MapDef {
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }
}

/// One placed node on a map. `target` names the monitored object it stands
/// for; plain images carry no reference at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub target: ElementRef,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub icons: IconSlots,
    #[serde(default)]
    pub label: String,
    /// Overrides the map-wide label location when set.
    #[serde(default)]
    pub label_location: Option<LabelLocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ElementRef {
    Host(HostId),
    HostGroup(GroupId),
    Trigger(TriggerId),
    Map(MapId),
    Image,
}

impl ElementRef {
    pub fn kind(&self) -> ElementKind {
        match self {
            ElementRef::Host(_) => ElementKind::Host,
            ElementRef::HostGroup(_) => ElementKind::HostGroup,
            ElementRef::Trigger(_) => ElementKind::Trigger,
            ElementRef::Map(_) => ElementKind::Map,
            ElementRef::Image => ElementKind::Image,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Host,
    HostGroup,
    Trigger,
    Map,
    Image,
}

/// Per-state icon image ids. Id 0 means the slot is unset and falls back to
/// the `off` slot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IconSlots {
    #[serde(default)]
    pub off: ImageId,
    #[serde(default)]
    pub on: ImageId,
    #[serde(default)]
    pub unknown: ImageId,
    #[serde(default)]
    pub disabled: ImageId,
    #[serde(default)]
    pub maintenance: ImageId,
}

/// An edge between two elements. Link triggers override the default draw
/// style while the referenced trigger is enabled and firing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub from: ElementId,
    pub to: ElementId,
    #[serde(default)]
    pub style: DrawStyle,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub triggers: Vec<LinkTrigger>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkTrigger {
    pub trigger: TriggerId,
    pub style: DrawStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawStyle {
    #[serde(default)]
    pub line: LineStyle,
    /// `RRGGBB` hex color.
    #[serde(default = "default_link_color")]
    pub color: String,
}

fn default_link_color() -> String {
    "000000".to_string()
}

impl Default for DrawStyle {
    fn default() -> Self {
        DrawStyle {
            line: LineStyle::Line,
            color: default_link_color(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    #[default]
    Line,
    Bold,
    Dashed,
    Dotted,
}

/// What the element labels are composed of.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelPolicy {
    /// Expanded label text plus status lines.
    #[default]
    Label,
    /// Host IP address plus status lines (hosts only; other kinds fall back
    /// to the full label).
    Ip,
    /// Element name only.
    Name,
    /// Status lines only.
    Status,
    Nothing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelLocation {
    Top,
    Left,
    Right,
    #[default]
    Bottom,
}

/// Which problem counters show up in status labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckFilter {
    #[default]
    All,
    Unacknowledged,
    Both,
}

impl AckFilter {
    pub fn shows_problems(self) -> bool {
        matches!(self, AckFilter::All | AckFilter::Both)
    }

    pub fn shows_unack(self) -> bool {
        matches!(self, AckFilter::Unacknowledged | AckFilter::Both)
    }
}

/// Trigger importance tier; the numeric tie-break inside the PROBLEM state.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    NotClassified,
    Information,
    Warning,
    Average,
    High,
    Disaster,
}

/// A trigger's current value. Distinct from [`StatusKind`]: this is what the
/// monitoring side reports, before aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerValue {
    #[default]
    Ok,
    Problem,
    Unknown,
}

/// Aggregated severity. The derived `Ord` is the worst-state ordering:
/// PROBLEM > UNKNOWN > OK.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    #[default]
    Ok,
    Unknown,
    Problem,
}

impl From<TriggerValue> for StatusKind {
    fn from(value: TriggerValue) -> Self {
        match value {
            TriggerValue::Ok => StatusKind::Ok,
            TriggerValue::Problem => StatusKind::Problem,
            TriggerValue::Unknown => StatusKind::Unknown,
        }
    }
}

/// Resolved display state; selects the configured icon slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconType {
    #[default]
    Off,
    On,
    Unknown,
    Disabled,
    Maintenance,
}
