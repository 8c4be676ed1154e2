// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/atticguard

//! Payload codec - StructureNode manufacturer data
//!
//! Every decode resolves the format from the discriminator byte, checks the
//! exact frame length for that format, and only then extracts fields. Each
//! numeric field has a scale and a valid range; values outside it are
//! reported, never clamped.
//!
//! | Discriminator | Format | Length | Sequence number |
//! |---------------|--------|--------|-----------------|
//! | 0x03 | V3A | 12 bytes | no |
//! | 0x04 | V4 | 16 bytes | yes (u16) |
//!
//! All multi-byte fields are little-endian.

pub mod battery;
mod v3a;
mod v4;

pub use v3a::V3aFrame;
pub use v4::V4Frame;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sensors::Measurement;

/// Company identifier StructureNodes advertise under
pub const DEFAULT_COMPANY_ID: u16 = 0xFFFF;

/// Displacement and tilt are both transmitted in hundredths
const HUNDREDTHS: f64 = 100.0;

/// Payload format versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadFormat {
    V3a,
    V4,
    Unknown,
}

impl PayloadFormat {
    pub fn from_discriminator(byte: u8) -> Self {
        match byte {
            v3a::DISCRIMINATOR => PayloadFormat::V3a,
            v4::DISCRIMINATOR => PayloadFormat::V4,
            _ => PayloadFormat::Unknown,
        }
    }

    /// Exact frame length, `None` for unknown formats
    pub fn frame_len(&self) -> Option<usize> {
        match self {
            PayloadFormat::V3a => Some(v3a::LEN),
            PayloadFormat::V4 => Some(v4::LEN),
            PayloadFormat::Unknown => None,
        }
    }

    pub fn has_sequence(&self) -> bool {
        matches!(self, PayloadFormat::V4)
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadFormat::V3a => f.write_str("V3A"),
            PayloadFormat::V4 => f.write_str("V4"),
            PayloadFormat::Unknown => f.write_str("unknown"),
        }
    }
}

/// Range-checked payload fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    Displacement,
    Tilt,
    Temperature,
    Humidity,
    BatteryPercent,
    BatteryVoltage,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Displacement => "displacement",
            Field::Tilt => "tilt",
            Field::Temperature => "temperature",
            Field::Humidity => "humidity",
            Field::BatteryPercent => "battery_pct",
            Field::BatteryVoltage => "battery_mv",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeError {
    #[error("unsupported payload format (discriminator 0x{0:02x})")]
    UnsupportedFormat(u8),

    #[error("malformed {format} payload: expected {expected} bytes, got {actual}")]
    Malformed {
        format: PayloadFormat,
        expected: usize,
        actual: usize,
    },

    #[error("{field} out of range (raw value {raw})")]
    ValueOutOfRange { field: Field, raw: i64 },

    #[error("manufacturer data from foreign company id 0x{0:04x}")]
    ForeignVendor(u16),
}

/// A successfully decoded payload, one variant per format
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodedPayload {
    V3a(V3aFrame),
    V4(V4Frame),
}

impl DecodedPayload {
    pub fn format(&self) -> PayloadFormat {
        match self {
            DecodedPayload::V3a(_) => PayloadFormat::V3a,
            DecodedPayload::V4(_) => PayloadFormat::V4,
        }
    }

    pub fn sequence(&self) -> Option<u16> {
        match self {
            DecodedPayload::V3a(_) => None,
            DecodedPayload::V4(frame) => Some(frame.sequence),
        }
    }

    pub fn measurement(&self) -> Measurement {
        match self {
            DecodedPayload::V3a(frame) => frame.measurement(),
            DecodedPayload::V4(frame) => frame.measurement(),
        }
    }
}

/// Decode a StructureNode payload (manufacturer data without the company id)
pub fn decode(payload: &[u8]) -> Result<DecodedPayload, DecodeError> {
    let Some(&discriminator) = payload.first() else {
        return Err(DecodeError::Malformed {
            format: PayloadFormat::Unknown,
            expected: 1,
            actual: 0,
        });
    };

    match PayloadFormat::from_discriminator(discriminator) {
        PayloadFormat::V3a => {
            check_len(PayloadFormat::V3a, v3a::LEN, payload)?;
            v3a::parse(payload).map(DecodedPayload::V3a)
        }
        PayloadFormat::V4 => {
            check_len(PayloadFormat::V4, v4::LEN, payload)?;
            v4::parse(payload).map(DecodedPayload::V4)
        }
        PayloadFormat::Unknown => Err(DecodeError::UnsupportedFormat(discriminator)),
    }
}

/// Split vendor-prefixed manufacturer data into company id and payload
pub fn split_vendor(data: &[u8]) -> Result<(u16, &[u8]), DecodeError> {
    if data.len() < 2 {
        return Err(DecodeError::Malformed {
            format: PayloadFormat::Unknown,
            expected: 2,
            actual: data.len(),
        });
    }
    let company = u16::from_le_bytes([data[0], data[1]]);
    Ok((company, &data[2..]))
}

/// Decode vendor-prefixed manufacturer data, accepting only `company_id`
pub fn decode_manufacturer_data(data: &[u8], company_id: u16) -> Result<DecodedPayload, DecodeError> {
    let (company, payload) = split_vendor(data)?;
    if company != company_id {
        return Err(DecodeError::ForeignVendor(company));
    }
    decode(payload)
}

fn check_len(format: PayloadFormat, expected: usize, payload: &[u8]) -> Result<(), DecodeError> {
    if payload.len() != expected {
        return Err(DecodeError::Malformed {
            format,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn in_range(field: Field, raw: i64, min: i64, max: i64) -> Result<i64, DecodeError> {
    if raw < min || raw > max {
        return Err(DecodeError::ValueOutOfRange { field, raw });
    }
    Ok(raw)
}

/// Displacement, hundredths of a millimetre, ±250.00 mm
fn displacement_mm(raw: i16) -> Result<f64, DecodeError> {
    in_range(Field::Displacement, raw as i64, -25_000, 25_000).map(|v| v as f64 / HUNDREDTHS)
}

/// Tilt, hundredths of a degree, ±90.00°
fn tilt_deg(raw: i16) -> Result<f64, DecodeError> {
    in_range(Field::Tilt, raw as i64, -9_000, 9_000).map(|v| v as f64 / HUNDREDTHS)
}

fn humidity_pct(raw: u8) -> Result<f64, DecodeError> {
    in_range(Field::Humidity, raw as i64, 0, 100).map(|v| v as f64)
}

fn battery_pct(raw: u8) -> Result<u8, DecodeError> {
    in_range(Field::BatteryPercent, raw as i64, 0, 100).map(|v| v as u8)
}

fn le_i16(bytes: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Frame builders for tests elsewhere in the crate
#[cfg(test)]
pub(crate) mod testing {
    /// V3A frame with nominal values apart from displacement
    pub fn v3a_payload(displacement_raw: i16) -> Vec<u8> {
        let mut b = vec![0u8; super::v3a::LEN];
        b[0] = super::v3a::DISCRIMINATOR;
        b[1..3].copy_from_slice(&displacement_raw.to_le_bytes());
        b[3] = 21u8; // 21 °C
        b[4] = 87;
        b[5..7].copy_from_slice(&150i16.to_le_bytes());
        b[7] = 55;
        b[8..10].copy_from_slice(&600u16.to_le_bytes());
        b
    }

    /// V4 frame with nominal values apart from sequence, displacement and flags
    pub fn v4_payload(sequence: u16, displacement_raw: i16, flags: u8) -> Vec<u8> {
        let mut b = vec![0u8; super::v4::LEN];
        b[0] = super::v4::DISCRIMINATOR;
        b[1] = flags;
        b[2..4].copy_from_slice(&sequence.to_le_bytes());
        b[4..6].copy_from_slice(&displacement_raw.to_le_bytes());
        b[6..8].copy_from_slice(&(-250i16).to_le_bytes());
        b[8..10].copy_from_slice(&1850i16.to_le_bytes());
        b[10] = 62;
        b[11] = 90;
        b[12..14].copy_from_slice(&4100u16.to_le_bytes());
        b[14..16].copy_from_slice(&1440u16.to_le_bytes());
        b
    }

    /// Prefix a payload with a little-endian company id
    pub fn with_vendor(company_id: u16, payload: &[u8]) -> Vec<u8> {
        let mut data = company_id.to_le_bytes().to_vec();
        data.extend_from_slice(payload);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_v3a() {
        let decoded = decode(&v3a_payload(-1234)).unwrap();
        assert_eq!(decoded.format(), PayloadFormat::V3a);
        assert_eq!(decoded.sequence(), None);

        let m = decoded.measurement();
        assert!((m.displacement_mm - -12.34).abs() < 1e-9);
        assert!((m.tilt_deg - 1.5).abs() < 1e-9);
        assert_eq!(m.temperature_c, 21.0);
        assert_eq!(m.humidity_pct, 55.0);
        assert_eq!(m.battery_pct, 87);
        assert_eq!(m.battery_mv, None);
        assert_eq!(m.device_uptime, Some(std::time::Duration::from_secs(600 * 60)));
        assert!(!m.low_power);
        assert_eq!(m.site_hint, None);
    }

    #[test]
    fn test_decode_v4() {
        let decoded = decode(&v4_payload(4242, 2500, 0b0000_1001)).unwrap();
        assert_eq!(decoded.format(), PayloadFormat::V4);
        assert_eq!(decoded.sequence(), Some(4242));

        let m = decoded.measurement();
        assert!((m.displacement_mm - 25.0).abs() < 1e-9);
        assert!((m.tilt_deg - -2.5).abs() < 1e-9);
        assert!((m.temperature_c - 18.5).abs() < 1e-9);
        assert_eq!(m.battery_mv, Some(4100));
        assert!(m.low_power);
        assert!(!m.battery_low);
        assert_eq!(m.site_hint, Some(crate::sensors::Site::Basement));
    }

    #[test]
    fn test_unknown_discriminator() {
        let mut payload = v3a_payload(0);
        payload[0] = 0x02;
        assert_eq!(decode(&payload), Err(DecodeError::UnsupportedFormat(0x02)));
    }

    #[test]
    fn test_empty_payload_is_malformed() {
        assert!(matches!(decode(&[]), Err(DecodeError::Malformed { actual: 0, .. })));
    }

    #[test]
    fn test_wrong_length_is_malformed() {
        let mut payload = v3a_payload(0);
        payload.push(0);
        assert_eq!(
            decode(&payload),
            Err(DecodeError::Malformed {
                format: PayloadFormat::V3a,
                expected: 12,
                actual: 13
            })
        );

        let payload = &v4_payload(1, 0, 0)[..15];
        assert_eq!(
            decode(payload),
            Err(DecodeError::Malformed {
                format: PayloadFormat::V4,
                expected: 16,
                actual: 15
            })
        );
    }

    #[test]
    fn test_out_of_range_reported() {
        let payload = v3a_payload(25_001);
        assert_eq!(
            decode(&payload),
            Err(DecodeError::ValueOutOfRange {
                field: Field::Displacement,
                raw: 25_001
            })
        );

        let mut payload = v3a_payload(0);
        payload[4] = 101;
        assert_eq!(
            decode(&payload),
            Err(DecodeError::ValueOutOfRange {
                field: Field::BatteryPercent,
                raw: 101
            })
        );
    }

    #[test]
    fn test_range_edges_accepted() {
        assert!(decode(&v3a_payload(25_000)).is_ok());
        assert!(decode(&v3a_payload(-25_000)).is_ok());
    }

    #[test]
    fn test_vendor_prefix() {
        let data = with_vendor(DEFAULT_COMPANY_ID, &v4_payload(7, 0, 0));
        let decoded = decode_manufacturer_data(&data, DEFAULT_COMPANY_ID).unwrap();
        assert_eq!(decoded.sequence(), Some(7));

        let data = with_vendor(0x0499, &v4_payload(7, 0, 0));
        assert_eq!(
            decode_manufacturer_data(&data, DEFAULT_COMPANY_ID),
            Err(DecodeError::ForeignVendor(0x0499))
        );

        assert!(matches!(
            decode_manufacturer_data(&[0xFF], DEFAULT_COMPANY_ID),
            Err(DecodeError::Malformed { expected: 2, actual: 1, .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_correct_length_decodes_or_reports_range(
            v4 in any::<bool>(),
            body in proptest::collection::vec(any::<u8>(), 15),
        ) {
            let mut payload = if v4 {
                vec![0x04]
            } else {
                vec![0x03]
            };
            let len = if v4 { 15 } else { 11 };
            payload.extend_from_slice(&body[..len]);

            match decode(&payload) {
                Ok(decoded) => {
                    let m = decoded.measurement();
                    prop_assert!(m.displacement_mm.abs() <= 250.0);
                    prop_assert!(m.tilt_deg.abs() <= 90.0);
                    prop_assert!((-40.0..=85.0).contains(&m.temperature_c));
                    prop_assert!((0.0..=100.0).contains(&m.humidity_pct));
                    prop_assert!(m.battery_pct <= 100);
                }
                Err(err) => prop_assert!(
                    matches!(err, DecodeError::ValueOutOfRange { .. }),
                    "unexpected error {:?}", err
                ),
            }
        }

        #[test]
        fn prop_wrong_length_is_malformed(
            v4 in any::<bool>(),
            body in proptest::collection::vec(any::<u8>(), 0..40),
        ) {
            let expected = if v4 { 16 } else { 12 };
            prop_assume!(body.len() + 1 != expected);

            let mut payload = vec![if v4 { 0x04 } else { 0x03 }];
            payload.extend_from_slice(&body);

            let is_malformed = matches!(decode(&payload), Err(DecodeError::Malformed { .. }));
            prop_assert!(is_malformed);
        }
    }
}
