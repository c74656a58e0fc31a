//! Tracing subscriber setup shared by setid binaries

use tracing_subscriber::EnvFilter;

use crate::{Error, Result};

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (from the TOML
/// `[logging]` section) is used for every target.
pub fn init_tracing(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", default_level, e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| Error::Config(format!("Tracing already initialized: {}", e)))
}
