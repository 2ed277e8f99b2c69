pub mod error;
mod registry;

pub use error::PluginError;
pub use registry::{Plugin, PluginMetadata, PluginRegistry, CONFIDENCE_THRESHOLD};
