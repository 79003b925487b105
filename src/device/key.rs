//! Session key material.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::SetupError;

/// Longest secret the login payload can carry, in bytes.
pub const MAX_SECRET_LEN: usize = u8::MAX as usize;

/// Secret and public key used to log in to a device.
///
/// Owned by exactly one session. Never cloned, never logged: the `Debug`
/// output is redacted and the buffers are wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DeviceKey {
    secret_key: Vec<u8>,
    public_key: Vec<u8>,
}

impl DeviceKey {
    /// Build a key from opaque secret and public key material.
    ///
    /// Only the secret's length is checked; the device judges the rest.
    pub fn new(
        secret_key: impl Into<Vec<u8>>,
        public_key: impl Into<Vec<u8>>,
    ) -> Result<Self, SetupError> {
        let key = Self {
            secret_key: secret_key.into(),
            public_key: public_key.into(),
        };
        if key.secret_key.len() > MAX_SECRET_LEN {
            return Err(SetupError::KeyTooLong {
                len: key.secret_key.len(),
            });
        }
        Ok(key)
    }

    /// Credential blob handed to the transport with the login opcode.
    ///
    /// Layout: `[secret_len: u8][secret][public]`. The adapter turns this
    /// into the vendor's signed login exchange.
    pub(crate) fn login_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(1 + self.secret_key.len() + self.public_key.len());
        payload.push(self.secret_key.len() as u8);
        payload.extend_from_slice(&self.secret_key);
        payload.extend_from_slice(&self.public_key);
        payload
    }
}

impl fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceKey").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let key = DeviceKey::new("a13d4b890111676ba8fb36ece7e94f7d", "0123456789abcdef").unwrap();
        let debug = format!("{:?}", key);
        assert!(!debug.contains("a13d4b89"));
        assert!(!debug.contains("0123456789abcdef"));
        assert!(debug.contains("DeviceKey"));
    }

    #[test]
    fn test_login_payload_layout() {
        let key = DeviceKey::new(vec![1, 2, 3], vec![9, 9]).unwrap();
        assert_eq!(key.login_payload(), vec![3, 1, 2, 3, 9, 9]);
    }

    #[test]
    fn test_login_payload_empty_keys() {
        let key = DeviceKey::new(Vec::new(), Vec::new()).unwrap();
        assert_eq!(key.login_payload(), vec![0]);
    }

    #[test]
    fn test_longest_secret_fits_prefix() {
        let key = DeviceKey::new(vec![7; MAX_SECRET_LEN], vec![1]).unwrap();
        let payload = key.login_payload();
        assert_eq!(payload[0] as usize, MAX_SECRET_LEN);
        assert_eq!(payload.len(), 1 + MAX_SECRET_LEN + 1);
    }

    #[test]
    fn test_oversized_secret_rejected() {
        let err = DeviceKey::new(vec![7; MAX_SECRET_LEN + 1], vec![1]).unwrap_err();
        assert_eq!(err, SetupError::KeyTooLong { len: 256 });
    }
}
