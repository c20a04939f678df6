//! Log output for processes that embed codescope.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `codescope=debug`.
pub const LOG_ENV_VAR: &str = "CODESCOPE_LOG";

/// Install a `tracing` subscriber writing to stderr.
///
/// The filter comes from `CODESCOPE_LOG` and defaults to `info`. Returns
/// `false` if a global subscriber was already installed.
///
/// # Examples
///
/// ```
/// codescope::init_logging();
/// assert!(!codescope::init_logging());
/// ```
pub fn init_logging() -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
