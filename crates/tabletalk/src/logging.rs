//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::TabletalkError;

/// Installs a human-readable `tracing` subscriber for the process.
///
/// `level` is any `EnvFilter` directive (`"info"`, `"tabletalk=debug"`);
/// a `RUST_LOG` environment variable takes precedence over it.
///
/// # Errors
/// [`TabletalkError::Logging`] if a global subscriber is already set.
pub fn init_logging(level: &str) -> Result<(), TabletalkError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_names(true))
        .try_init()?;

    tracing::debug!(level, "logging initialized");
    Ok(())
}
