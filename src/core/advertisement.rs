// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/atticguard

//! Raw advertisements as delivered by a scanning transport

use serde::{Deserialize, Serialize};

use crate::sensors::{ReceivedAt, SensorId};

/// One BLE advertisement, consumed once by the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAdvertisement {
    pub address: SensorId,
    pub rssi: i16,
    /// Company id (little-endian) followed by the sensor payload
    #[serde(with = "base64_bytes")]
    pub manufacturer_data: Vec<u8>,
    #[serde(flatten)]
    pub received_at: ReceivedAt,
}

impl RawAdvertisement {
    pub fn new(address: SensorId, rssi: i16, manufacturer_data: Vec<u8>, received_at: ReceivedAt) -> Self {
        Self {
            address,
            rssi,
            manufacturer_data,
            received_at,
        }
    }

    /// Leading bytes as hex, for diagnostics
    pub fn hex_prefix(&self, n: usize) -> String {
        self.manufacturer_data
            .iter()
            .take(n)
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}
