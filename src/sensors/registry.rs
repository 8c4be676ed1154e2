// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/atticguard

//! Sensor registry - per-sensor ingest state

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::Serialize;
use tracing::{debug, info};

use super::{Location, Reading, SensorId};

/// State the core keeps for one sensor
#[derive(Debug, Clone, Serialize)]
pub struct SensorRecord {
    pub sensor_id: SensorId,
    pub first_seen: DateTime<Utc>,
    pub last_sequence: Option<u16>,
    pub last_reading: Option<Reading>,
    pub location: Option<Location>,
    pub low_power: bool,
    pub accepted: u64,
    pub duplicates: u64,
}

impl SensorRecord {
    fn new(sensor_id: SensorId, first_seen: DateTime<Utc>, location: Option<Location>) -> Self {
        Self {
            sensor_id,
            first_seen,
            last_sequence: None,
            last_reading: None,
            location,
            low_power: false,
            accepted: 0,
            duplicates: 0,
        }
    }

    /// Record an accepted reading. Caller holds the sensor lock.
    pub(crate) fn accept(&mut self, reading: Reading) {
        if let Some(seq) = reading.sequence() {
            self.last_sequence = Some(seq);
        }
        self.low_power = reading.measurement().low_power;
        self.accepted += 1;
        self.last_reading = Some(reading);
    }

    pub(crate) fn note_duplicate(&mut self) {
        self.duplicates += 1;
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_reading.as_ref().map(|r| r.received_at().wall)
    }

    pub fn location_label(&self) -> String {
        match &self.location {
            Some(location) => format!("{} ({})", location.label, location.site),
            None => "unlocated".to_string(),
        }
    }
}

/// Shared handle to one sensor's record.
///
/// Locking it serializes all ingest work for that sensor.
#[derive(Debug, Clone)]
pub struct SensorHandle(Arc<Mutex<SensorRecord>>);

impl SensorHandle {
    pub fn lock(&self) -> MutexGuard<'_, SensorRecord> {
        self.0.lock()
    }

    pub fn snapshot(&self) -> SensorRecord {
        self.0.lock().clone()
    }
}

/// Sensor count and most recent update across the fleet
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySummary {
    pub sensors: usize,
    pub located: usize,
    pub last_update: Option<DateTime<Utc>>,
}

/// Registry of every sensor seen since startup
#[derive(Default)]
pub struct SensorRegistry {
    sensors: RwLock<HashMap<SensorId, SensorHandle>>,
    locations: RwLock<HashMap<SensorId, Location>>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `sensor_id`, creating an empty record on first sight
    pub fn lookup_or_create(&self, sensor_id: SensorId, seen_at: DateTime<Utc>) -> SensorHandle {
        if let Some(handle) = self.sensors.read().get(&sensor_id) {
            return handle.clone();
        }

        let mut sensors = self.sensors.write();
        sensors
            .entry(sensor_id)
            .or_insert_with(|| {
                let location = self.locations.read().get(&sensor_id).cloned();
                let record = SensorRecord::new(sensor_id, seen_at, location);
                info!("New sensor discovered: {} [{}]", sensor_id, record.location_label());
                SensorHandle(Arc::new(Mutex::new(record)))
            })
            .clone()
    }

    /// Overwrite last sequence/reading for an accepted reading
    pub fn update(&self, sensor_id: SensorId, reading: Reading) {
        let handle = self.lookup_or_create(sensor_id, reading.received_at().wall);
        handle.lock().accept(reading);
    }

    /// Attach installation metadata. May precede the sensor's first advertisement.
    pub fn assign_location(&self, sensor_id: SensorId, location: Location) {
        debug!("Assigning {} to {}", sensor_id, location.label);
        self.locations.write().insert(sensor_id, location.clone());

        if let Some(handle) = self.handle(&sensor_id) {
            handle.lock().location = Some(location);
        }
    }

    pub fn location(&self, sensor_id: &SensorId) -> Option<Location> {
        self.locations.read().get(sensor_id).cloned()
    }

    pub fn get(&self, sensor_id: &SensorId) -> Option<SensorRecord> {
        self.handle(sensor_id).map(|h| h.snapshot())
    }

    pub fn len(&self) -> usize {
        self.sensors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<SensorRecord> {
        let mut records: Vec<SensorRecord> = self.handles().iter().map(|h| h.snapshot()).collect();
        records.sort_by_key(|r| r.sensor_id);
        records
    }

    /// Sensors whose last accepted reading is older than `max_age`
    pub fn stale_sensors(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<SensorId> {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let mut stale: Vec<SensorId> = self
            .handles()
            .iter()
            .filter_map(|h| {
                let record = h.lock();
                match record.last_update() {
                    Some(at) if now - at > max_age => Some(record.sensor_id),
                    _ => None,
                }
            })
            .collect();
        stale.sort();
        stale
    }

    pub fn summary(&self) -> RegistrySummary {
        let records = self.snapshot();
        RegistrySummary {
            sensors: records.len(),
            located: records.iter().filter(|r| r.location.is_some()).count(),
            last_update: records.iter().filter_map(|r| r.last_update()).max(),
        }
    }

    fn handle(&self, sensor_id: &SensorId) -> Option<SensorHandle> {
        self.sensors.read().get(sensor_id).cloned()
    }

    // Clone handles out so per-sensor locks are never taken under the map lock
    fn handles(&self) -> Vec<SensorHandle> {
        self.sensors.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, testing::v4_payload};
    use crate::sensors::{ReceivedAt, Site};

    fn id(n: u8) -> SensorId {
        SensorId::new([0xAA, 0, 0, 0, 0, n])
    }

    fn reading(sensor: SensorId, seq: u16, at: DateTime<Utc>) -> Reading {
        let decoded = decode(&v4_payload(seq, 0, 0)).unwrap();
        Reading::from_decoded(sensor, &decoded, -70, ReceivedAt::new(Duration::from_secs(seq as u64), at))
    }

    #[test]
    fn test_first_sight_creates_empty_record() {
        let registry = SensorRegistry::new();
        let handle = registry.lookup_or_create(id(1), Utc::now());

        let record = handle.snapshot();
        assert_eq!(record.last_sequence, None);
        assert!(record.last_reading.is_none());
        assert_eq!(record.location_label(), "unlocated");
        assert_eq!(registry.len(), 1);

        // Same handle on second lookup
        registry.lookup_or_create(id(1), Utc::now()).lock().accepted = 3;
        assert_eq!(handle.snapshot().accepted, 3);
    }

    #[test]
    fn test_update_overwrites_state() {
        let registry = SensorRegistry::new();
        let now = Utc::now();
        registry.update(id(1), reading(id(1), 10, now));
        registry.update(id(1), reading(id(1), 11, now));

        let record = registry.get(&id(1)).unwrap();
        assert_eq!(record.last_sequence, Some(11));
        assert_eq!(record.accepted, 2);
        assert_eq!(record.last_reading.unwrap().sequence(), Some(11));
    }

    #[test]
    fn test_location_assigned_before_first_sight() {
        let registry = SensorRegistry::new();
        registry.assign_location(id(2), Location::new(Site::Attic, "north gable"));
        let record = registry.lookup_or_create(id(2), Utc::now()).snapshot();
        assert_eq!(record.location_label(), "north gable (Attic)");

        registry.assign_location(id(2), Location::new(Site::Basement, "sump wall"));
        assert_eq!(registry.get(&id(2)).unwrap().location.unwrap().site, Site::Basement);
        assert_eq!(registry.summary().located, 1);
    }

    #[test]
    fn test_stale_sensors() {
        let registry = SensorRegistry::new();
        let now = Utc::now();
        registry.update(id(1), reading(id(1), 1, now - chrono::Duration::minutes(30)));
        registry.update(id(2), reading(id(2), 1, now - chrono::Duration::minutes(5)));
        registry.lookup_or_create(id(3), now);

        let stale = registry.stale_sensors(now, Duration::from_secs(20 * 60));
        assert_eq!(stale, vec![id(1)]);
        assert_eq!(registry.summary().last_update, Some(now - chrono::Duration::minutes(5)));
    }

    #[test]
    fn test_concurrent_sensors_are_independent() {
        let registry = SensorRegistry::new();
        let now = Utc::now();

        std::thread::scope(|scope| {
            for n in 0..8u8 {
                let registry = &registry;
                scope.spawn(move || {
                    for seq in 1..=200u16 {
                        registry.update(id(n), reading(id(n), seq, now));
                    }
                });
            }
        });

        for n in 0..8u8 {
            let record = registry.get(&id(n)).unwrap();
            assert_eq!(record.last_sequence, Some(200));
            assert_eq!(record.accepted, 200);
        }
    }
}
