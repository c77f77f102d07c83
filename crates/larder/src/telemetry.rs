//! Log output.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `larder_sync=debug,info`.
pub const LOG_ENV: &str = "LARDER_LOG";

/// Install a formatted stderr subscriber filtered by [`LOG_ENV`].
///
/// Falls back to `info` when the variable is unset or invalid. Returns
/// `false` if a global subscriber was already installed.
pub fn init() -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
