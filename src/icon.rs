use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::directory::Directory;
use crate::model::{IconSlots, IconType, ImageId, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Rgb {
        Rgb { r, g, b }
    }

    /// Parses an `RRGGBB` hex string. A pure conversion; no palette state.
    pub fn parse(hex: &str) -> Result<Rgb> {
        let hex = hex.trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("invalid RRGGBB color '{hex}'");
        }
        let channel = |range| u8::from_str_radix(&hex[range], 16).unwrap_or(0);
        Ok(Rgb::new(channel(0..2), channel(2..4), channel(4..6)))
    }

    pub fn to_hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

// Status message palette.
pub const RED: Rgb = Rgb::new(255, 0, 0);
pub const DARK_RED: Rgb = Rgb::new(150, 0, 0);
pub const DARK_GREEN: Rgb = Rgb::new(0, 150, 0);
pub const GRAY: Rgb = Rgb::new(150, 150, 150);
pub const ORANGE: Rgb = Rgb::new(255, 153, 51);
pub const BLACK: Rgb = Rgb::new(0, 0, 0);
pub const WHITE: Rgb = Rgb::new(255, 255, 255);

// Halo tints.
pub const HALO_UNKNOWN: Rgb = Rgb::new(0xCC, 0xCC, 0xCC);
pub const HALO_UNAVAILABLE: Rgb = Rgb::new(0xFF, 0x00, 0x00);
pub const HALO_DISABLED: Rgb = Rgb::new(0xEE, 0xEE, 0xEE);
pub const HALO_MAINTENANCE: Rgb = Rgb::new(0xFF, 0x99, 0x33);
pub const HALO_BORDER: Rgb = Rgb::new(120, 120, 120);
pub const HALO_SHADOW: Rgb = Rgb::new(220, 220, 220);
pub const ACK_ARC: Rgb = Rgb::new(50, 150, 50);

/// Severity tint for the highlight ellipse behind a problem element.
pub fn halo_color(priority: Priority) -> Rgb {
    match priority {
        Priority::Disaster => Rgb::new(0xFF, 0x00, 0x00),
        Priority::High => Rgb::new(0xFF, 0x88, 0x88),
        Priority::Average => Rgb::new(0xDD, 0xAA, 0xAA),
        Priority::Warning => Rgb::new(0xEF, 0xEF, 0xCC),
        Priority::Information => Rgb::new(0xCC, 0xE2, 0xCC),
        Priority::NotClassified => Rgb::new(0xC0, 0xE0, 0xC0),
    }
}

pub const DEFAULT_ICON_SIZE: f32 = 32.0;

/// A resolved, drawable icon. `data` is present when the image record
/// carries an embedded PNG payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Icon {
    pub id: ImageId,
    pub name: String,
    pub width: f32,
    pub height: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Icon {
    fn placeholder() -> Icon {
        Icon {
            id: 0,
            name: "unknown image".to_string(),
            width: DEFAULT_ICON_SIZE,
            height: DEFAULT_ICON_SIZE,
            data: None,
        }
    }
}

/// Selects the icon slot matching the resolved icon type; an unset slot
/// falls back to `off`, and an unresolvable image id to a placeholder.
pub fn resolve_icon(directory: &dyn Directory, slots: &IconSlots, icon_type: IconType) -> Icon {
    let slot = match icon_type {
        IconType::Off => slots.off,
        IconType::On => slots.on,
        IconType::Unknown => slots.unknown,
        IconType::Disabled => slots.disabled,
        IconType::Maintenance => slots.maintenance,
    };
    let id = if slot == 0 { slots.off } else { slot };

    match directory.image(id) {
        Some(image) => Icon {
            id: image.id,
            name: image.name,
            width: image.width,
            height: image.height,
            data: image.data,
        },
        None => Icon::placeholder(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{ImageRecord, World};

    #[test]
    fn parses_hex_colors() {
        assert_eq!(Rgb::parse("FF9933").unwrap(), ORANGE);
        assert_eq!(Rgb::parse("#000000").unwrap(), BLACK);
        assert!(Rgb::parse("12345").is_err());
        assert!(Rgb::parse("GG0000").is_err());
    }

    #[test]
    fn unset_slot_falls_back_to_off() {
        let world = World {
            images: vec![ImageRecord {
                id: 10,
                name: "server".into(),
                width: 48.0,
                height: 48.0,
                data: None,
            }],
            ..World::default()
        };
        let slots = IconSlots { off: 10, ..IconSlots::default() };

        let icon = resolve_icon(&world, &slots, IconType::Maintenance);
        assert_eq!(icon.id, 10);
    }

    #[test]
    fn missing_image_yields_placeholder() {
        let world = World::default();
        let slots = IconSlots { off: 99, ..IconSlots::default() };

        let icon = resolve_icon(&world, &slots, IconType::Off);
        assert_eq!(icon.id, 0);
        assert_eq!(icon.width, DEFAULT_ICON_SIZE);
    }
}
