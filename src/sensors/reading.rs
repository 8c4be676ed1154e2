// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/atticguard

//! Decoded readings and the metadata attached to them

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::SensorId;
use crate::codec::{DecodedPayload, PayloadFormat};

/// Receipt timestamp of an advertisement.
///
/// `monotonic` is an offset from the scanning transport's clock origin and is
/// the only value used for ordering decisions. `wall` is what gets stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedAt {
    #[serde(rename = "monotonic_ms", with = "duration_ms")]
    pub monotonic: Duration,
    pub wall: DateTime<Utc>,
}

impl ReceivedAt {
    pub fn new(monotonic: Duration, wall: DateTime<Utc>) -> Self {
        Self { monotonic, wall }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Where in the building a StructureNode is mounted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Site {
    Attic,
    Crawlspace,
    Basement,
    Other,
}

impl Site {
    /// Site from the 2-bit DIP switch code carried by V4 payloads
    pub fn from_dip(code: u8) -> Self {
        match code & 0b11 {
            0 => Site::Attic,
            1 => Site::Crawlspace,
            2 => Site::Basement,
            _ => Site::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Site::Attic => "Attic",
            Site::Crawlspace => "Crawlspace",
            Site::Basement => "Basement",
            Site::Other => "Other",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown site: {0} (expected attic, crawlspace, basement or other)")]
pub struct SiteParseError(pub String);

impl FromStr for Site {
    type Err = SiteParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attic" => Ok(Site::Attic),
            "crawlspace" => Ok(Site::Crawlspace),
            "basement" => Ok(Site::Basement),
            "other" => Ok(Site::Other),
            _ => Err(SiteParseError(s.to_string())),
        }
    }
}

/// Installation metadata, assigned administratively
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub site: Site,
    pub label: String,
}

impl Location {
    pub fn new(site: Site, label: impl Into<String>) -> Self {
        Self { site, label: label.into() }
    }
}

/// Measurement values carried by a payload, already scaled to SI-ish units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Crack/joint displacement in millimetres
    pub displacement_mm: f64,
    /// Tilt in degrees
    pub tilt_deg: f64,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub battery_pct: u8,
    /// Battery voltage, V4 only
    pub battery_mv: Option<u16>,
    /// Time since the sensor booted, when transmitted
    pub device_uptime: Option<Duration>,
    pub low_power: bool,
    pub battery_low: bool,
    /// DIP switch site setting, V4 only
    pub site_hint: Option<Site>,
}

impl Measurement {
    /// Dew point via the Magnus formula
    pub fn dew_point_c(&self) -> f64 {
        const A: f64 = 17.62;
        const B: f64 = 243.12;

        let rh = self.humidity_pct.clamp(0.1, 100.0);
        let t = self.temperature_c;
        let gamma = (A * t / (B + t)) + (rh / 100.0).ln();
        (B * gamma) / (A - gamma)
    }
}

/// A validated, decoded reading from one advertisement.
///
/// Only built from a successful decode and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    sensor_id: SensorId,
    format: PayloadFormat,
    sequence: Option<u16>,
    measurement: Measurement,
    rssi: i16,
    received_at: ReceivedAt,
}

impl Reading {
    pub(crate) fn from_decoded(
        sensor_id: SensorId,
        decoded: &DecodedPayload,
        rssi: i16,
        received_at: ReceivedAt,
    ) -> Self {
        Self {
            sensor_id,
            format: decoded.format(),
            sequence: decoded.sequence(),
            measurement: decoded.measurement(),
            rssi,
            received_at,
        }
    }

    pub fn sensor_id(&self) -> SensorId {
        self.sensor_id
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    pub fn sequence(&self) -> Option<u16> {
        self.sequence
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    pub fn rssi(&self) -> i16 {
        self.rssi
    }

    pub fn received_at(&self) -> ReceivedAt {
        self.received_at
    }
}
