//! Logging initialization and configuration.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor an explicit level is given.
pub const DEFAULT_FILTER: &str = "sesame_ble=info";

fn env_filter(directives: Option<&str>) -> EnvFilter {
    match directives {
        Some(directives) => {
            EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
        }
        None => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
        }
    }
}

/// Initialize the logging system.
///
/// Uses the `RUST_LOG` environment variable for filtering. If not set,
/// defaults to `sesame_ble=info`.
///
/// # Panics
///
/// Panics if called more than once, or if another tracing subscriber
/// has already been set.
pub fn init() {
    tracing_subscriber::registry()
        .with(env_filter(None))
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}

/// Try to initialize the logging system.
///
/// Returns `Ok(())` if successful, or `Err` if logging has already been
/// initialized.
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(None))
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}

/// Try to initialize logging with explicit filter directives,
/// e.g. the `logging.level` value from [`crate::config::Config`].
///
/// Bare levels such as `debug` apply to every target. Invalid directives
/// fall back to [`DEFAULT_FILTER`].
pub fn init_with_filter(directives: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(Some(directives)))
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_idempotent() {
        // Whichever test runs first installs the subscriber
        let _ = try_init();
        let _ = try_init();
        let _ = init_with_filter("debug");
    }

    #[test]
    fn test_logging_works() {
        let _ = try_init();

        tracing::info!(device = "AABBCCDDEEFF", "test info message");
        tracing::debug!("test debug message");
        tracing::warn!(attempt = 3, "test warn message");
    }

    #[test]
    fn test_invalid_directive_falls_back() {
        // Must not panic on garbage input
        let _ = env_filter(Some("sesame_ble=[[["));
    }
}
