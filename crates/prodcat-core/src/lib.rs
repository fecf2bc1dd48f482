//! Prodcat Core: shared types, error taxonomy, configuration, category table.

pub mod capabilities;
pub mod categories;
pub mod config;
pub mod error;
pub mod schedule;
pub mod types;

pub use capabilities::DeviceCapabilities;
pub use categories::{category_name, category_or_default, CATEGORIES, UNKNOWN_CATEGORY};
pub use config::{load_yaml_section, DataPaths, PipelineConfig};
pub use error::{Error, Result};
pub use schedule::RolloutSchedule;
pub use types::*;
