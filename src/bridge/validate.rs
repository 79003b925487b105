//! One-shot check of setup input against the real device.

use std::sync::Arc;

use tracing::{debug, info};

use super::SetupInput;
use crate::error::{ConnectError, SetupError};
use crate::session::{Session, SessionConfig};
use crate::transport::Transport;

/// Connect and log in once with `input`, then let go of the device.
///
/// Returns the device's unique id. Transient failures are retried with
/// the configured budget; running out of it, or any scan failure, is
/// reported as [`SetupError::CannotConnect`]. A rejected login is
/// [`SetupError::InvalidAuth`].
pub async fn validate_setup(
    transport: Arc<dyn Transport>,
    input: &SetupInput,
    config: SessionConfig,
) -> Result<String, SetupError> {
    let identity = input.identity()?;
    let key = input.key()?;
    let unique_id = identity.unique_id();
    let session = Session::spawn(identity, key, transport, config);

    let outcome = session.connect().await;
    if outcome.is_ok() {
        if let Err(e) = session.disconnect().await {
            debug!(unique_id = %unique_id, error = %e, "disconnect after validation failed");
        }
    }
    session.shutdown().await;

    match outcome {
        Ok(()) => {
            info!(unique_id = %unique_id, "setup validated");
            Ok(unique_id)
        }
        Err(ConnectError::Auth(_)) => Err(SetupError::InvalidAuth),
        Err(e) => {
            debug!(unique_id = %unique_id, error = %e, "setup validation failed");
            Err(SetupError::CannotConnect)
        }
    }
}
