//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Builds the filter: `RUST_LOG` when set, otherwise `level` for this crate.
pub fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,parachute_daq={level}")))
}

/// Installs the global fmt subscriber. Later calls are no-ops.
pub fn init(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(false)
        .try_init();
}
