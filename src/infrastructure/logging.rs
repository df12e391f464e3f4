use crate::infrastructure::error::InfraError;
use std::io::IsTerminal;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Installs the stderr subscriber. `RUST_LOG` wins over `default_level`.
///
/// Calling this again after a subscriber is installed is not an error.
pub fn init_logging(default_level: &str) -> Result<(), InfraError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|error| InfraError::InvalidConfig(format!("invalid RUST_LOG / log filter: {error}")))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(error) = init_result {
        debug!(%error, "tracing subscriber already installed");
    }
    Ok(())
}
