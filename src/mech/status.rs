//! Decoded lock mechanism snapshot.

use serde::Serialize;

/// Physical state of a lock mechanism at one point in time.
///
/// Replaced wholesale by every successfully decoded notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MechStatus {
    battery: u8,
    locked: bool,
    position: Option<i16>,
}

impl MechStatus {
    /// Create a snapshot. `battery` is clamped to 100.
    pub fn new(battery: u8, locked: bool, position: Option<i16>) -> Self {
        Self {
            battery: battery.min(100),
            locked,
            position,
        }
    }

    /// Battery charge, 0-100.
    pub fn battery_percentage(&self) -> u8 {
        self.battery
    }

    /// Whether the position lies within the device's locked window.
    pub fn is_in_lock_range(&self) -> bool {
        self.locked
    }

    /// Raw mechanical position, when the device reports one.
    pub fn position(&self) -> Option<i16> {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_clamped() {
        let status = MechStatus::new(250, true, None);
        assert_eq!(status.battery_percentage(), 100);
    }

    #[test]
    fn test_accessors() {
        let status = MechStatus::new(73, false, Some(-12));
        assert_eq!(status.battery_percentage(), 73);
        assert!(!status.is_in_lock_range());
        assert_eq!(status.position(), Some(-12));
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_value(MechStatus::new(50, true, Some(3))).unwrap();
        assert_eq!(json["battery"], 50);
        assert_eq!(json["locked"], true);
        assert_eq!(json["position"], 3);
    }
}
