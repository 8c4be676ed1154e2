// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/atticguard

//! BLE device addresses used as sensor identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Sensor identifier: the 6-byte BLE address of a StructureNode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorId([u8; 6]);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid BLE address '{0}'")]
pub struct AddressParseError(pub String);

impl SensorId {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl From<[u8; 6]> for SensorId {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for SensorId {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(|c| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(AddressParseError(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (slot, part) in bytes.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(AddressParseError(s.to_string()));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| AddressParseError(s.to_string()))?;
        }

        Ok(Self(bytes))
    }
}

impl Serialize for SensorId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SensorId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_and_parse() {
        let id = SensorId::new([0xC4, 0x4F, 0x33, 0x0A, 0x1B, 0xFE]);
        assert_eq!(id.to_string(), "C4:4F:33:0A:1B:FE");
        assert_eq!("c4-4f-33-0a-1b-fe".parse::<SensorId>().unwrap(), id);
    }

    #[test]
    fn test_address_rejects_garbage() {
        assert!("C4:4F:33:0A:1B".parse::<SensorId>().is_err());
        assert!("C4:4F:33:0A:1B:GG".parse::<SensorId>().is_err());
        assert!("C44:F:33:0A:1B:FE".parse::<SensorId>().is_err());
    }

    #[test]
    fn test_address_serde_as_string() {
        let id = SensorId::new([1, 2, 3, 4, 5, 6]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"01:02:03:04:05:06\"");
        let back: SensorId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
