//! Analysis module - motion detection and risk scoring on accepted readings
//!
//! Each sensor gets its own window and risk tracker, created on its first
//! reading and locked independently. Analysis never fails: when a window
//! holds too little data the reading simply produces no events.

mod events;
mod risk;
mod statistics;
mod window;

pub use events::{DerivedEvent, EventKind};
pub use risk::{RiskLevel, RiskTracker};
pub use statistics::{linear_slope, mean};
pub use window::{AnalysisWindow, WindowSample};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

pub use crate::config::AnalysisConfig;
use crate::sensors::{Reading, SensorId};

struct SensorAnalysis {
    window: AnalysisWindow,
    risk: RiskTracker,
}

/// Main analysis engine
pub struct AnalysisEngine {
    config: AnalysisConfig,
    sensors: RwLock<HashMap<SensorId, Arc<Mutex<SensorAnalysis>>>>,
}

impl AnalysisEngine {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            sensors: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Derive events for an accepted reading, motion first then risk
    pub fn analyze(&self, reading: &Reading) -> Vec<DerivedEvent> {
        let state = self.state_for(reading.sensor_id());
        let mut state = state.lock();
        let mut events = Vec::new();

        let now = reading.received_at().monotonic;
        let low_power = reading.measurement().low_power;
        let displacement_mm = reading.measurement().displacement_mm;

        let evicted = state.window.evict_older_than(now, self.config.horizon(low_power));
        if evicted > 0 {
            debug!("{}: {} samples aged out of window", reading.sensor_id(), evicted);
        }

        if let Some(baseline_mm) = state.window.baseline(self.config.baseline_len) {
            let delta_mm = displacement_mm - baseline_mm;
            if delta_mm.abs() > self.config.motion_threshold_mm {
                info!(
                    "Motion on {}: {:.2} mm vs baseline {:.2} mm",
                    reading.sensor_id(),
                    displacement_mm,
                    baseline_mm
                );
                events.push(DerivedEvent::new(
                    reading,
                    EventKind::MotionDetected {
                        displacement_mm,
                        baseline_mm,
                        delta_mm,
                    },
                ));
            }
        }

        state.window.push(WindowSample {
            at: now,
            displacement_mm,
        });

        if state.window.len() >= self.config.min_trend_samples {
            if let Some(trend) = state.window.trend_mm_per_hour() {
                let score = trend.abs();
                if let Some((previous, level)) = state.risk.update(score) {
                    info!(
                        "Risk on {} changed {} -> {} ({:.3} mm/h)",
                        reading.sensor_id(),
                        previous,
                        level,
                        score
                    );
                    events.push(DerivedEvent::new(
                        reading,
                        EventKind::RiskLevelChanged {
                            previous,
                            level,
                            score_mm_per_hour: score,
                        },
                    ));
                }
            }
        }

        events
    }

    /// Current risk level, `None` for sensors never analyzed
    pub fn risk_level(&self, sensor_id: &SensorId) -> Option<RiskLevel> {
        let state = self.sensors.read().get(sensor_id).cloned()?;
        let level = state.lock().risk.level();
        Some(level)
    }

    pub fn window_len(&self, sensor_id: &SensorId) -> usize {
        match self.sensors.read().get(sensor_id).cloned() {
            Some(state) => state.lock().window.len(),
            None => 0,
        }
    }

    fn state_for(&self, sensor_id: SensorId) -> Arc<Mutex<SensorAnalysis>> {
        if let Some(state) = self.sensors.read().get(&sensor_id) {
            return state.clone();
        }

        self.sensors
            .write()
            .entry(sensor_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(SensorAnalysis {
                    window: AnalysisWindow::new(self.config.window_capacity),
                    risk: RiskTracker::new(self.config.risk),
                }))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::codec::{decode, testing::v4_payload};
    use crate::config::{HysteresisBand, RiskThresholds};
    use crate::sensors::ReceivedAt;

    const SENSOR: SensorId = SensorId::new([0xC0, 0xFF, 0xEE, 0, 0, 1]);

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            window_capacity: 16,
            window_horizon_secs: 3600,
            low_power_widening: 4.0,
            baseline_len: 4,
            motion_threshold_mm: 0.5,
            min_trend_samples: 4,
            risk: RiskThresholds {
                elevated: HysteresisBand { rising: 1.0, falling: 0.8 },
                critical: HysteresisBand { rising: 5.0, falling: 4.0 },
            },
        }
    }

    /// Reading at `secs` with displacement in hundredths of a millimetre
    fn reading_at(secs: u64, displacement_centi: i16, low_power: bool) -> Reading {
        let flags = if low_power { 0b1 } else { 0 };
        let decoded = decode(&v4_payload(secs as u16, displacement_centi, flags)).unwrap();
        Reading::from_decoded(SENSOR, &decoded, -60, ReceivedAt::new(Duration::from_secs(secs), Utc::now()))
    }

    fn motion_count(events: &[DerivedEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::MotionDetected { .. }))
            .count()
    }

    fn settle(engine: &AnalysisEngine) {
        for i in 0..4 {
            engine.analyze(&reading_at(i * 60, 1000, false));
        }
    }

    #[test]
    fn test_first_reading_has_no_events() {
        let engine = AnalysisEngine::new(config());
        assert!(engine.analyze(&reading_at(0, 1000, false)).is_empty());
        assert_eq!(engine.window_len(&SENSOR), 1);
    }

    #[test]
    fn test_motion_above_threshold() {
        let engine = AnalysisEngine::new(config());
        settle(&engine);

        // Baseline 10.00 mm, reading 10.51 mm
        let events = engine.analyze(&reading_at(300, 1051, false));
        assert_eq!(motion_count(&events), 1);
        match events[0].kind {
            EventKind::MotionDetected { delta_mm, baseline_mm, .. } => {
                assert!((baseline_mm - 10.0).abs() < 1e-9);
                assert!((delta_mm - 0.51).abs() < 1e-9);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(events[0].sensor_id, SENSOR);
    }

    #[test]
    fn test_motion_threshold_is_exclusive() {
        let mut cfg = config();
        cfg.motion_threshold_mm = 0.25;
        let engine = AnalysisEngine::new(cfg);
        settle(&engine);

        // Exactly 0.25 mm below baseline: not motion
        let events = engine.analyze(&reading_at(300, 975, false));
        assert_eq!(motion_count(&events), 0);
    }

    #[test]
    fn test_motion_just_below_threshold() {
        let engine = AnalysisEngine::new(config());
        settle(&engine);

        let events = engine.analyze(&reading_at(300, 1049, false));
        assert_eq!(motion_count(&events), 0);
    }

    #[test]
    fn test_risk_needs_min_samples() {
        let engine = AnalysisEngine::new(config());
        // Steep trend, but only three samples
        for i in 0..3u64 {
            let events = engine.analyze(&reading_at(i * 600, (i * 100) as i16, false));
            assert!(events.iter().all(|e| e.risk_level().is_none()));
        }
        assert_eq!(engine.risk_level(&SENSOR), Some(RiskLevel::Normal));
    }

    #[test]
    fn test_risk_escalates_once() {
        let engine = AnalysisEngine::new(config());
        let mut changes = Vec::new();

        // 0.15 mm every 5 minutes = 1.8 mm/h, small steps so no motion
        for i in 0..8u64 {
            let events = engine.analyze(&reading_at(i * 300, (i * 15) as i16, false));
            assert_eq!(motion_count(&events), 0);
            changes.extend(events.iter().filter_map(|e| e.risk_level()));
        }

        assert_eq!(changes, vec![RiskLevel::Elevated]);
        assert_eq!(engine.risk_level(&SENSOR), Some(RiskLevel::Elevated));
    }

    #[test]
    fn test_low_power_widens_horizon() {
        // Readings every 2 hours, horizon 1 hour
        let normal = AnalysisEngine::new(config());
        let sparse = AnalysisEngine::new(config());
        for i in 0..4u64 {
            normal.analyze(&reading_at(i * 7200, 1000, false));
            sparse.analyze(&reading_at(i * 7200, 1000, true));
        }

        assert_eq!(normal.window_len(&SENSOR), 1);
        // 4 h effective horizon keeps the last three samples
        assert_eq!(sparse.window_len(&SENSOR), 3);
    }

    #[test]
    fn test_sensors_have_separate_windows() {
        let engine = AnalysisEngine::new(config());
        settle(&engine);

        let other = SensorId::new([0xC0, 0xFF, 0xEE, 0, 0, 2]);
        let decoded = decode(&v4_payload(1, 5000, 0)).unwrap();
        let reading = Reading::from_decoded(other, &decoded, -60, ReceivedAt::new(Duration::from_secs(400), Utc::now()));

        assert!(engine.analyze(&reading).is_empty());
        assert_eq!(engine.window_len(&other), 1);
        assert_eq!(engine.window_len(&SENSOR), 4);
    }
}
