//! Tracing subscriber setup for the binary.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install the global subscriber once. `RUST_LOG` overrides the default
/// `info` filter. Logs go to stderr so stdout stays clean for reports.
pub fn init_logging(json: bool) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let result = if json {
            tracing_subscriber::fmt()
                .json()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .try_init()
        } else {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .try_init()
        };

        if let Err(e) = result {
            eprintln!("logging already initialized: {e}");
        }
    });
}
