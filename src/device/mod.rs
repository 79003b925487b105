//! Device identity and key material.
//!
//! Both are supplied once at setup time and never mutated afterwards.

mod identity;
mod key;

pub use identity::{DeviceIdentity, DeviceType, MANUFACTURER};
pub use key::{DeviceKey, MAX_SECRET_LEN};
