//! Host-platform surface.
//!
//! A home-automation host supplies [`SetupInput`]s, forwards lock and
//! unlock requests through a [`LockRegistry`] and receives state through
//! a [`HostObserver`].

mod registry;
mod validate;

pub use registry::{DeviceSummary, LockRegistry};
pub use validate::validate_setup;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::device::{DeviceIdentity, DeviceKey, DeviceType};
use crate::error::SetupError;
use crate::events::{DeviceEvent, EventKind, Observer};
use crate::mech::MechStatus;
use crate::session::SessionState;

/// What the host collects when a device is set up.
///
/// Keys are opaque apart from the secret length limit.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupInput {
    /// MAC address or platform UUID.
    pub mac_address: String,
    pub secret_key: String,
    pub pub_key: String,
    /// Vendor model tag, e.g. `sesame_2`.
    pub device_type: String,
}

impl std::fmt::Debug for SetupInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupInput")
            .field("mac_address", &self.mac_address)
            .field("device_type", &self.device_type)
            .finish_non_exhaustive()
    }
}

impl SetupInput {
    pub fn identity(&self) -> Result<DeviceIdentity, SetupError> {
        let device_type: DeviceType = self.device_type.parse()?;
        Ok(DeviceIdentity::new(self.mac_address.clone(), device_type))
    }

    pub fn key(&self) -> Result<DeviceKey, SetupError> {
        DeviceKey::new(self.secret_key.as_bytes(), self.pub_key.as_bytes())
    }
}

/// Callbacks the host platform implements.
#[async_trait]
pub trait HostObserver: Send + Sync {
    async fn on_state_changed(&self, device: &DeviceIdentity, state: SessionState);

    async fn on_mech_status_changed(&self, device: &DeviceIdentity, status: &MechStatus);
}

/// Adapts a [`HostObserver`] to the session event stream.
pub(crate) struct HostAdapter(pub(crate) Arc<dyn HostObserver>);

#[async_trait]
impl Observer for HostAdapter {
    async fn on_event(&self, event: &DeviceEvent) {
        match &event.kind {
            EventKind::StateChanged { new, .. } => {
                self.0.on_state_changed(&event.device, *new).await
            }
            EventKind::MechStatusChanged(status) => {
                self.0.on_mech_status_changed(&event.device, status).await
            }
        }
    }
}
