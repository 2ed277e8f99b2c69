use thiserror::Error;

/// Failures raised by registry bookkeeping, not by plugin execution
/// (a plugin's own failure is folded into its `ResponseEnvelope`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error("a plugin named {0:?} is already registered")]
    DuplicateName(String),
}
