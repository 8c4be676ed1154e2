//! V3A frame: 12 bytes, no sequence number

use std::time::Duration;

use super::{battery_pct, displacement_mm, humidity_pct, in_range, le_i16, le_u16, tilt_deg, DecodeError, Field};
use crate::sensors::Measurement;

pub(super) const DISCRIMINATOR: u8 = 0x03;
pub(super) const LEN: usize = 12;

// Offsets
const DISPLACEMENT: usize = 1;
const TEMPERATURE: usize = 3;
const BATTERY: usize = 4;
const TILT: usize = 5;
const HUMIDITY: usize = 7;
const UPTIME: usize = 8;
// 10..12 reserved for the firmware checksum, not interpreted

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct V3aFrame {
    pub displacement_mm: f64,
    pub temperature_c: f64,
    pub battery_pct: u8,
    pub tilt_deg: f64,
    pub humidity_pct: f64,
    pub uptime: Duration,
}

impl V3aFrame {
    pub fn measurement(&self) -> Measurement {
        Measurement {
            displacement_mm: self.displacement_mm,
            tilt_deg: self.tilt_deg,
            temperature_c: self.temperature_c,
            humidity_pct: self.humidity_pct,
            battery_pct: self.battery_pct,
            battery_mv: None,
            device_uptime: Some(self.uptime),
            low_power: false,
            battery_low: false,
            site_hint: None,
        }
    }
}

/// Caller has already checked discriminator and length
pub(super) fn parse(b: &[u8]) -> Result<V3aFrame, DecodeError> {
    let temperature = in_range(Field::Temperature, b[TEMPERATURE] as i8 as i64, -40, 85)?;

    Ok(V3aFrame {
        displacement_mm: displacement_mm(le_i16(b, DISPLACEMENT))?,
        temperature_c: temperature as f64,
        battery_pct: battery_pct(b[BATTERY])?,
        tilt_deg: tilt_deg(le_i16(b, TILT))?,
        humidity_pct: humidity_pct(b[HUMIDITY])?,
        uptime: Duration::from_secs(le_u16(b, UPTIME) as u64 * 60),
    })
}
