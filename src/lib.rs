//! # sesame-ble
//!
//! Session core for Sesame Bluetooth-Low-Energy smart locks.
//!
//! This crate owns the hard part of talking to a lock: establishing an
//! authenticated session, recovering from transient radio and stack
//! errors, noticing silent disconnects and logging in again, while
//! presenting consistent state to the host. The radio itself is supplied
//! by the host through the [`Transport`] and [`DeviceHandle`] traits.
//!
//! ## Features
//!
//! - **One task per device**: transport callbacks are funnelled into a
//!   single serialized session, so there is no shared mutable state
//! - **Bounded retry**: transient failures retry up to a budget, a
//!   rejected login never does
//! - **Ordered events**: state and mech status changes are fanned out to
//!   observers without a slow observer stalling the session
//! - **Single-flight commands**: at most one lock/unlock in flight per device
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sesame_ble::{DeviceIdentity, DeviceKey, DeviceType, Session, SessionConfig, Transport};
//!
//! async fn run(transport: Arc<dyn Transport>) -> sesame_ble::Result<()> {
//!     // Initialize logging
//!     sesame_ble::logging::try_init().ok();
//!
//!     let identity = DeviceIdentity::new("AA:BB:CC:DD:EE:FF", DeviceType::Sesame4);
//!     let key = DeviceKey::new(b"secret".to_vec(), b"public".to_vec())?;
//!     let session = Session::spawn(identity, key, transport, SessionConfig::default());
//!
//!     session.connect().await?;
//!     session.lock(sesame_ble::DEFAULT_HISTORY_TAG).await?;
//!     println!("state: {}", session.current_state());
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod logging;
pub mod mech;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use bridge::{validate_setup, DeviceSummary, HostObserver, LockRegistry, SetupInput};
pub use config::{Config, ConfigError};
pub use device::{DeviceIdentity, DeviceKey, DeviceType};
pub use error::{
    AuthError, CommandError, ConnectError, DecodeError, DisconnectError, Result, ScanError,
    SesameError, SetupError, TransportError,
};
pub use events::{DeviceEvent, EventKind, EventNotifier, Observer, SubscriptionHandle};
pub use mech::{LockWindow, MechDecoder, MechStatus};
pub use session::{
    CommandKind, FailureReason, RetryPolicy, Session, SessionConfig, SessionState,
    DEFAULT_HISTORY_TAG,
};
pub use transport::{DeviceHandle, Opcode, Transport, TransportEvent};
