//! Mechanical status decoder.
//!
//! Payload layout (little endian):
//!
//! ```text
//! 0      2      4        6
//! +------+------+--------+-----------
//! | batt | tgt  | pos    | ignored...
//! +------+------+--------+-----------
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::MechStatus;
use crate::device::DeviceType;
use crate::error::DecodeError;

/// Shortest payload the decoder accepts.
pub const MIN_PAYLOAD_LEN: usize = 6;

/// Maps a raw battery sensor code to a 0-100 percentage.
///
/// Implementations must be monotonic in the raw code.
pub trait BatteryCurve: Send + Sync {
    fn percentage(&self, raw: u16) -> u8;
}

impl<F> BatteryCurve for F
where
    F: Fn(u16) -> u8 + Send + Sync,
{
    fn percentage(&self, raw: u16) -> u8 {
        self(raw)
    }
}

/// Piecewise-linear voltage curve.
///
/// The raw code is first scaled to volts, then interpolated between the
/// table points and rounded to the nearest percent.
#[derive(Debug, Clone)]
pub struct VoltageTableCurve {
    volts_per_code: f64,
    /// `(volts, percent)` pairs, strictly descending in volts.
    points: Vec<(f64, f64)>,
}

impl VoltageTableCurve {
    /// Build a curve from `(volts, percent)` points in descending voltage order.
    pub fn new(volts_per_code: f64, points: Vec<(f64, f64)>) -> Self {
        Self {
            volts_per_code,
            points,
        }
    }

    /// Discharge curve of the Sesame battery pack (2x CR123A, 10-bit ADC over 7.2 V).
    pub fn sesame() -> Self {
        Self::new(
            7.2 / 1023.0,
            vec![
                (6.0, 100.0),
                (5.8, 50.0),
                (5.7, 40.0),
                (5.6, 32.0),
                (5.4, 21.0),
                (5.2, 13.0),
                (5.1, 10.0),
                (5.0, 7.0),
                (4.8, 3.0),
                (4.6, 0.0),
            ],
        )
    }

    /// Voltage for a raw code.
    pub fn voltage(&self, raw: u16) -> f64 {
        f64::from(raw) * self.volts_per_code
    }
}

impl Default for VoltageTableCurve {
    fn default() -> Self {
        Self::sesame()
    }
}

impl BatteryCurve for VoltageTableCurve {
    fn percentage(&self, raw: u16) -> u8 {
        let (Some(&(top_v, top_p)), Some(&(bottom_v, bottom_p))) =
            (self.points.first(), self.points.last())
        else {
            return 0;
        };

        let volts = self.voltage(raw);
        if volts >= top_v {
            return top_p.round().clamp(0.0, 100.0) as u8;
        }
        if volts <= bottom_v {
            return bottom_p.round().clamp(0.0, 100.0) as u8;
        }

        for pair in self.points.windows(2) {
            let (upper_v, upper_p) = pair[0];
            let (lower_v, lower_p) = pair[1];
            if volts <= upper_v && volts > lower_v {
                let ratio = (volts - lower_v) / (upper_v - lower_v);
                let pct = (upper_p - lower_p) * ratio + lower_p;
                return pct.round().clamp(0.0, 100.0) as u8;
            }
        }
        0
    }
}

/// Inclusive range of raw positions that count as locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockWindow {
    pub min: i16,
    pub max: i16,
}

impl LockWindow {
    pub fn new(min: i16, max: i16) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, position: i16) -> bool {
        (self.min..=self.max).contains(&position)
    }

    /// Factory window for a device type.
    ///
    /// Locks are calibrated so the locked thumb-turn sits around zero. The
    /// bot has no lock range and always reports unlocked.
    pub fn default_for(device_type: DeviceType) -> Option<LockWindow> {
        device_type.is_lock().then(|| LockWindow::new(-256, 256))
    }
}

/// Turns raw notifications into [`MechStatus`] snapshots.
#[derive(Clone)]
pub struct MechDecoder {
    curve: Arc<dyn BatteryCurve>,
    window: Option<LockWindow>,
}

impl MechDecoder {
    pub fn new(curve: Arc<dyn BatteryCurve>, window: Option<LockWindow>) -> Self {
        Self { curve, window }
    }

    /// Decoder with the Sesame battery curve and the factory window.
    pub fn for_device_type(device_type: DeviceType) -> Self {
        Self::new(
            Arc::new(VoltageTableCurve::sesame()),
            LockWindow::default_for(device_type),
        )
    }

    /// Replace the locked window.
    pub fn with_window(mut self, window: Option<LockWindow>) -> Self {
        self.window = window;
        self
    }

    pub fn window(&self) -> Option<LockWindow> {
        self.window
    }

    /// Decode one notification.
    pub fn decode(&self, raw: &[u8]) -> Result<MechStatus, DecodeError> {
        if raw.len() < MIN_PAYLOAD_LEN {
            return Err(DecodeError::Malformed { len: raw.len() });
        }

        let battery_code = u16::from_le_bytes([raw[0], raw[1]]);
        let position = i16::from_le_bytes([raw[4], raw[5]]);

        let battery = self.curve.percentage(battery_code);
        let locked = self.window.is_some_and(|w| w.contains(position));

        Ok(MechStatus::new(battery, locked, Some(position)))
    }
}

impl fmt::Debug for MechDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MechDecoder")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
