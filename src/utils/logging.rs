// ============================================================================
// Tracing Setup
// ============================================================================

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber for the engine's `tracing` output.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies (for example
/// `"ledger_exchange=debug"`). Returns `false` if a global subscriber was
/// already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
