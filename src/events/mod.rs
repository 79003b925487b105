//! Session events and their fan-out.

mod notifier;

pub use notifier::{EventNotifier, SubscriptionHandle};

use async_trait::async_trait;

use crate::device::DeviceIdentity;
use crate::mech::MechStatus;
use crate::session::SessionState;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// The session moved from `old` to `new`.
    StateChanged { old: SessionState, new: SessionState },
    /// A new mechanical status was decoded.
    MechStatusChanged(MechStatus),
}

/// Event published by one device's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub device: DeviceIdentity,
    pub kind: EventKind,
}

impl DeviceEvent {
    pub fn state_changed(device: DeviceIdentity, old: SessionState, new: SessionState) -> Self {
        Self {
            device,
            kind: EventKind::StateChanged { old, new },
        }
    }

    pub fn mech_status_changed(device: DeviceIdentity, status: MechStatus) -> Self {
        Self {
            device,
            kind: EventKind::MechStatusChanged(status),
        }
    }
}

/// Receives events on its own task.
///
/// A slow observer only delays its own queue; it never stalls the
/// session or other observers.
#[async_trait]
pub trait Observer: Send + Sync {
    async fn on_event(&self, event: &DeviceEvent);
}
