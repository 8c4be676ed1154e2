//! Events derived from accepted readings

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::RiskLevel;
use crate::sensors::{Reading, SensorId};

/// What the analysis engine observed
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum EventKind {
    MotionDetected {
        displacement_mm: f64,
        baseline_mm: f64,
        delta_mm: f64,
    },
    RiskLevelChanged {
        previous: RiskLevel,
        level: RiskLevel,
        score_mm_per_hour: f64,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::MotionDetected { .. } => "motion_detected",
            EventKind::RiskLevelChanged { .. } => "risk_level_changed",
        }
    }
}

/// An immutable event, tagged with the reading that triggered it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedEvent {
    pub id: Uuid,
    pub sensor_id: SensorId,
    pub kind: EventKind,
    pub reading: Reading,
    pub timestamp: DateTime<Utc>,
}

impl DerivedEvent {
    pub fn new(reading: &Reading, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            sensor_id: reading.sensor_id(),
            kind,
            reading: reading.clone(),
            timestamp: reading.received_at().wall,
        }
    }

    pub fn risk_level(&self) -> Option<RiskLevel> {
        match self.kind {
            EventKind::RiskLevelChanged { level, .. } => Some(level),
            EventKind::MotionDetected { .. } => None,
        }
    }
}
