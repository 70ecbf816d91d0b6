//! `tracing` subscriber setup.
//!
//! Logs go to stderr so `chat-query ask` can print its JSON response on a
//! clean stdout. The filter comes from `RUST_LOG` when set.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "chat_query=info,tower_http=info";

/// Install the global subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init() {
    init_with_default(DEFAULT_FILTER);
}

pub fn init_with_default(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
