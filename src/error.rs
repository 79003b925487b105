//! Error types for sesame-ble.

use thiserror::Error;

use crate::session::SessionState;

/// Failure to locate a device by address.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// No advertisement from the address within the scan window.
    #[error("device {address} not found")]
    NotFound { address: String },

    /// The local adapter could not scan.
    #[error("adapter error: {0}")]
    Adapter(String),
}

/// Transient radio or BLE stack fault.
///
/// Every variant is worth retrying at the connection level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The radio is busy with another operation.
    #[error("radio busy")]
    RadioBusy,

    /// Error raised by the host BLE stack (D-Bus, adapter, GATT).
    #[error("BLE stack error: {0}")]
    Stack(String),

    /// The operation did not complete in time.
    #[error("transport timeout")]
    Timeout,

    /// The link is gone.
    #[error("link closed")]
    Closed,
}

/// Explicit login rejection. Retrying with the same key cannot succeed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("login rejected by device")]
    Rejected,
}

/// Bad mechanical status payload.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed mech status payload ({len} bytes)")]
    Malformed { len: usize },
}

/// Lock/unlock failure reported to the command caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The session is not authenticated.
    #[error("session not ready: current state is {0}")]
    NotReady(SessionState),

    /// Another command is still in flight for this device.
    #[error("another command is pending")]
    Busy,

    /// The command write failed. Not retried automatically.
    #[error("command write failed: {0}")]
    Transport(TransportError),

    /// The session task has stopped.
    #[error("session closed")]
    Closed,
}

/// Failure of a connect request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Transient failures used up the whole retry budget.
    #[error("retries exhausted")]
    RetriesExhausted,

    /// The request was superseded by an explicit disconnect.
    #[error("connect cancelled")]
    Cancelled,

    /// The session task has stopped.
    #[error("session closed")]
    Closed,
}

/// Failure of a disconnect request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisconnectError {
    #[error("disconnect failed: {0}")]
    Transport(TransportError),

    /// The session task has stopped.
    #[error("session closed")]
    Closed,
}

/// Outcome of validating setup input against a real device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// The device could not be reached or never answered.
    #[error("cannot connect to device")]
    CannotConnect,

    /// The device rejected the supplied keys.
    #[error("invalid authentication")]
    InvalidAuth,

    /// The device-type tag is not one of the known models.
    #[error("unknown device type: {0}")]
    InvalidDeviceType(String),

    /// The secret does not fit the login payload.
    #[error("secret key is {len} bytes, longer than 255")]
    KeyTooLong { len: usize },
}

/// Main error type for sesame-ble operations.
#[derive(Error, Debug)]
pub enum SesameError {
    /// No device with the given id is registered.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// A device with the given id is already registered.
    #[error("device already registered: {0}")]
    DeviceExists(String),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Disconnect(#[from] DisconnectError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: SessionState, to: SessionState },

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

/// Convenience Result type for sesame-ble operations.
pub type Result<T> = std::result::Result<T, SesameError>;
