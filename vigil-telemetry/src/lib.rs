mod audit;
pub mod error;
mod init;
pub mod sink;

pub use audit::{AuditContext, ChildFields, TraceMetadata};
pub use init::init_tracing;
pub use sink::{AuditSink, FileSink, StdoutSink};

use std::sync::Arc;

use vigil_core::config::AuditSinkKind;

/// Builds the configured [`AuditSink`] once at process start, as
/// `spec.md` §9 requires ("never initialize on first use").
pub fn build_sink(kind: &AuditSinkKind) -> Result<Arc<dyn AuditSink>, error::AuditSinkError> {
    match kind {
        AuditSinkKind::Stdout => Ok(Arc::new(StdoutSink::new())),
        AuditSinkKind::File(path) => Ok(Arc::new(FileSink::open(path)?)),
    }
}
