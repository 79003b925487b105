//! Transport adapter capability.
//!
//! The BLE radio itself (scanning, GATT, pairing, the vendor's login
//! cryptography) lives outside this crate. A host plugs it in by
//! implementing [`Transport`] and [`DeviceHandle`]; the session core only
//! relies on the operations below and treats every failure as possibly
//! transient.

mod pump;

pub use pump::EventPump;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{ScanError, TransportError};

/// Command opcodes understood by the device.
///
/// Values are the vendor item codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Login,
    Lock,
    Unlock,
}

impl Opcode {
    pub fn code(&self) -> u8 {
        match self {
            Opcode::Login => 2,
            Opcode::Lock => 82,
            Opcode::Unlock => 83,
        }
    }
}

/// Asynchronous event delivered by a device link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Raw mechanical status notification.
    MechStatus(Vec<u8>),
    /// The device acknowledged the login.
    LoginAccepted,
    /// The device explicitly denied the login.
    LoginRejected,
    /// The link dropped.
    Disconnected,
    /// The device stopped answering while the link looked up.
    NoSignal,
}

/// Scanner side of the adapter.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Scan for a device advertising `address` for at most `scan_duration`.
    async fn scan_by_address(
        &self,
        address: &str,
        scan_duration: Duration,
    ) -> Result<Arc<dyn DeviceHandle>, ScanError>;
}

/// One discovered peripheral.
#[async_trait]
pub trait DeviceHandle: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    async fn write_command(&self, opcode: Opcode, payload: &[u8]) -> Result<(), TransportError>;

    /// Take the event stream for this peripheral.
    ///
    /// Events must arrive in the order the device produced them. Returns
    /// `None` once the stream has been taken.
    fn take_events(&self) -> Option<mpsc::Receiver<TransportEvent>>;
}
