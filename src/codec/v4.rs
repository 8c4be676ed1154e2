//! V4 frame: 16 bytes, adds sequence number, flags and battery voltage

use std::time::Duration;

use super::battery::mv_to_percent;
use super::{battery_pct, displacement_mm, humidity_pct, in_range, le_i16, le_u16, tilt_deg, DecodeError, Field};
use crate::sensors::{Measurement, Site};

pub(super) const DISCRIMINATOR: u8 = 0x04;
pub(super) const LEN: usize = 16;

// Offsets
const FLAGS: usize = 1;
const SEQUENCE: usize = 2;
const DISPLACEMENT: usize = 4;
const TILT: usize = 6;
const TEMPERATURE: usize = 8;
const HUMIDITY: usize = 10;
const BATTERY: usize = 11;
const BATTERY_MV: usize = 12;
const UPTIME: usize = 14;

const FLAG_LOW_POWER: u8 = 0b0000_0001;
const FLAG_BATTERY_LOW: u8 = 0b0000_0010;
const SITE_SHIFT: u8 = 2;

/// Battery percentage byte meaning "derive from voltage"
const BATTERY_NOT_MEASURED: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct V4Frame {
    pub sequence: u16,
    pub low_power: bool,
    pub battery_low: bool,
    pub site: Site,
    pub displacement_mm: f64,
    pub tilt_deg: f64,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub battery_pct: u8,
    pub battery_mv: u16,
    pub uptime: Duration,
}

impl V4Frame {
    pub fn measurement(&self) -> Measurement {
        Measurement {
            displacement_mm: self.displacement_mm,
            tilt_deg: self.tilt_deg,
            temperature_c: self.temperature_c,
            humidity_pct: self.humidity_pct,
            battery_pct: self.battery_pct,
            battery_mv: Some(self.battery_mv),
            device_uptime: Some(self.uptime),
            low_power: self.low_power,
            battery_low: self.battery_low,
            site_hint: Some(self.site),
        }
    }
}

/// Caller has already checked discriminator and length
pub(super) fn parse(b: &[u8]) -> Result<V4Frame, DecodeError> {
    let flags = b[FLAGS];
    let temperature = in_range(Field::Temperature, le_i16(b, TEMPERATURE) as i64, -4_000, 8_500)?;
    let battery_mv = in_range(Field::BatteryVoltage, le_u16(b, BATTERY_MV) as i64, 2_500, 4_500)? as u16;

    let battery_pct = match b[BATTERY] {
        BATTERY_NOT_MEASURED => mv_to_percent(battery_mv),
        raw => battery_pct(raw)?,
    };

    Ok(V4Frame {
        sequence: le_u16(b, SEQUENCE),
        low_power: flags & FLAG_LOW_POWER != 0,
        battery_low: flags & FLAG_BATTERY_LOW != 0,
        site: Site::from_dip(flags >> SITE_SHIFT),
        displacement_mm: displacement_mm(le_i16(b, DISPLACEMENT))?,
        tilt_deg: tilt_deg(le_i16(b, TILT))?,
        temperature_c: temperature as f64 / 100.0,
        humidity_pct: humidity_pct(b[HUMIDITY])?,
        battery_pct,
        battery_mv,
        uptime: Duration::from_secs(le_u16(b, UPTIME) as u64 * 60),
    })
}
