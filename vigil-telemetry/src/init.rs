use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initializes the process-wide `tracing` subscriber once. Safe to call
/// more than once (subsequent calls are no-ops): the CLI entry point
/// calls this before constructing anything else, the way the ancestor
/// telemetry crate's own `init_telemetry` does for its console layer.
///
/// Level defaults to `info` and honors `RUST_LOG` when set, via
/// `tracing_subscriber::EnvFilter`. This is distinct from the
/// [`crate::audit`] event stream: this is ordinary process logging for
/// operators, not the business-level audit correlation stream.
pub fn init_tracing(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));
        fmt().with_env_filter(filter).with_target(true).init();
    });
}
