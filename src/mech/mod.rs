//! Mechanical status decoding.
//!
//! Raw status notifications become immutable [`MechStatus`] snapshots.
//! The battery curve and the locked window are device configuration and
//! are injected into the [`MechDecoder`].

mod decoder;
mod status;

pub use decoder::{BatteryCurve, LockWindow, MechDecoder, VoltageTableCurve, MIN_PAYLOAD_LEN};
pub use status::MechStatus;
