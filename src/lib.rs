pub mod cli;
pub mod cycle;
pub mod directory;
pub mod icon;
pub mod label;
pub mod model;
pub mod render;
pub mod status;
pub mod utils;

pub use cycle::would_create_cycle;
pub use directory::{Directory, TimeSeries, World};
pub use icon::{Icon, Rgb, resolve_icon};
pub use label::expand_label;
pub use model::{Element, ElementRef, Link, MapDef};
pub use render::{MapRenderer, Scene};
pub use status::{StatusContext, StatusError, StatusInfo, aggregate_map};
