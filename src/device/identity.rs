//! Device identity and model lookup.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SetupError;

/// Manufacturer reported for every supported model.
pub const MANUFACTURER: &str = "CANDY HOUSE";

/// Supported device models.
///
/// Parsed from the vendor tags `sesame_2`, `ssmbot_1` and `sesame_4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    #[serde(rename = "sesame_2")]
    Sesame2,
    #[serde(rename = "ssmbot_1")]
    SesameBot,
    #[serde(rename = "sesame_4")]
    Sesame4,
}

impl DeviceType {
    /// All known device types.
    pub const ALL: [DeviceType; 3] = [DeviceType::Sesame2, DeviceType::SesameBot, DeviceType::Sesame4];

    /// Vendor tag for this model.
    pub fn tag(&self) -> &'static str {
        match self {
            DeviceType::Sesame2 => "sesame_2",
            DeviceType::SesameBot => "ssmbot_1",
            DeviceType::Sesame4 => "sesame_4",
        }
    }

    /// Marketing name shown to users.
    ///
    /// Gen2 hardware is sold as SESAME 3, so it shares a name with SESAME 4.
    pub fn model_name(&self) -> &'static str {
        match self {
            DeviceType::Sesame2 | DeviceType::Sesame4 => "SESAME 3/4",
            DeviceType::SesameBot => "SESAME bot",
        }
    }

    /// Whether the device drives a lock thumb-turn.
    pub fn is_lock(&self) -> bool {
        !matches!(self, DeviceType::SesameBot)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for DeviceType {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceType::ALL
            .into_iter()
            .find(|t| t.tag() == s)
            .ok_or_else(|| SetupError::InvalidDeviceType(s.to_string()))
    }
}

/// Immutable identity of one physical device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    address: String,
    device_type: DeviceType,
}

impl DeviceIdentity {
    /// Create an identity from a MAC address (or UUID) and model.
    pub fn new(address: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            address: address.into(),
            device_type,
        }
    }

    /// Address or UUID exactly as supplied at setup.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Address with `-` and `:` separators removed, upper-cased.
    ///
    /// Used as the stable key for registries and entity ids.
    pub fn unique_id(&self) -> String {
        self.address
            .chars()
            .filter(|c| *c != '-' && *c != ':')
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    /// Human-readable device name.
    pub fn display_name(&self) -> String {
        format!("Sesame {}", self.unique_id())
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_type, self.address)
    }
}
