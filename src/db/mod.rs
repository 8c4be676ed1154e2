// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/atticguard

//! Database module for persistent storage

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::sensors::{Location, SensorId, Site};
use crate::sink::{SinkRecord, SinkWriteError, StorageSink};

/// Database manager
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_tables()?;

        info!("Database opened at {:?}", config.path);
        Ok(db)
    }

    /// In-memory database, nothing persisted
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- Accepted readings, one row per dedup key
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dedup_key TEXT NOT NULL UNIQUE,
                timestamp TEXT NOT NULL,
                sensor_id TEXT NOT NULL,
                format TEXT NOT NULL,
                sequence INTEGER,
                displacement_mm REAL NOT NULL,
                tilt_deg REAL NOT NULL,
                temperature_c REAL NOT NULL,
                humidity_pct REAL NOT NULL,
                battery_pct INTEGER NOT NULL,
                battery_mv INTEGER,
                low_power INTEGER NOT NULL,
                rssi INTEGER NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_readings_timestamp ON readings(timestamp);
            CREATE INDEX IF NOT EXISTS idx_readings_sensor ON readings(sensor_id);

            -- Derived events
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                reading_key TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                sensor_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                risk_level TEXT,
                data TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_events_sensor ON events(sensor_id);

            -- Installation metadata
            CREATE TABLE IF NOT EXISTS sensor_locations (
                sensor_id TEXT PRIMARY KEY,
                site TEXT NOT NULL,
                label TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        )?;

        Ok(())
    }

    /// Store records in one transaction, skipping keys already present.
    /// Returns the number of new readings.
    pub fn store_records(&self, records: &[SinkRecord]) -> Result<usize, SinkWriteError> {
        let conn = self.conn.lock();
        insert_records(&conn, records)
    }

    /// Query readings by time range, newest first
    pub fn query_readings(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sensor_id: Option<SensorId>,
        limit: Option<usize>,
    ) -> Result<Vec<StoredReading>> {
        let conn = self.conn.lock();
        let sensor = sensor_id.map(|s| s.to_string());

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, sensor_id, sequence, displacement_mm, temperature_c, battery_pct, low_power
             FROM readings
             WHERE timestamp >= ?1 AND timestamp <= ?2 AND (?3 IS NULL OR sensor_id = ?3)
             ORDER BY timestamp DESC LIMIT ?4",
        )?;

        let rows = stmt.query_map(
            params![
                db_time(start),
                db_time(end),
                sensor,
                limit.unwrap_or(1000) as i64
            ],
            |row| {
                Ok(StoredReading {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    sensor_id: row.get(2)?,
                    sequence: row.get(3)?,
                    displacement_mm: row.get(4)?,
                    temperature_c: row.get(5)?,
                    battery_pct: row.get(6)?,
                    low_power: row.get(7)?,
                })
            },
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Query events by time range, newest first
    pub fn query_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<StoredEvent>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, sensor_id, event_type, risk_level, data
             FROM events
             WHERE timestamp >= ?1 AND timestamp <= ?2
             ORDER BY timestamp DESC LIMIT ?3",
        )?;

        let rows = stmt.query_map(
            params![db_time(start), db_time(end), limit.unwrap_or(100) as i64],
            |row| {
                Ok(StoredEvent {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    sensor_id: row.get(2)?,
                    event_type: row.get(3)?,
                    risk_level: row.get(4)?,
                    data: row.get(5)?,
                })
            },
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn.lock();

        let reading_count: i64 = conn.query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        let event_count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        let size_bytes: i64 = conn
            .query_row(
                "SELECT page_count * page_size as size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        Ok(DatabaseStats {
            reading_count: reading_count as usize,
            event_count: event_count as usize,
            size_bytes: size_bytes as u64,
        })
    }

    /// Delete readings and events older than `retention_days`
    pub fn cleanup(&self, retention_days: u32) -> Result<usize> {
        let conn = self.conn.lock();
        let cutoff = db_time(Utc::now() - chrono::Duration::days(retention_days as i64));

        let deleted_readings = conn.execute("DELETE FROM readings WHERE timestamp < ?1", params![cutoff])?;
        let deleted_events = conn.execute("DELETE FROM events WHERE timestamp < ?1", params![cutoff])?;

        info!(
            "Cleaned up {} readings and {} events older than {} days",
            deleted_readings, deleted_events, retention_days
        );
        Ok(deleted_readings + deleted_events)
    }

    /// Persist a sensor's location
    pub fn set_location(&self, sensor_id: SensorId, location: &Location) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO sensor_locations (sensor_id, site, label, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                sensor_id.to_string(),
                location.site.label(),
                location.label,
                db_time(Utc::now())
            ],
        )?;
        Ok(())
    }

    pub fn location(&self, sensor_id: SensorId) -> Result<Option<Location>> {
        let conn = self.conn.lock();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT site, label FROM sensor_locations WHERE sensor_id = ?1",
                params![sensor_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(site, label)| Location::new(site.parse().unwrap_or(Site::Other), label)))
    }

    /// Every stored location, for seeding the registry at startup
    pub fn locations(&self) -> Result<Vec<(SensorId, Location)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT sensor_id, site, label FROM sensor_locations")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (sensor_id, site, label) = row?;
            match sensor_id.parse::<SensorId>() {
                Ok(id) => results.push((id, Location::new(site.parse().unwrap_or(Site::Other), label))),
                Err(e) => debug!("Ignoring stored location: {}", e),
            }
        }
        Ok(results)
    }
}

#[async_trait]
impl StorageSink for Database {
    async fn write_batch(&self, records: &[SinkRecord]) -> Result<(), SinkWriteError> {
        let conn = self.conn.clone();
        let records = records.to_vec();

        let inserted = tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            insert_records(&conn, &records)
        })
        .await
        .map_err(|e| SinkWriteError::Unavailable(format!("database task failed: {}", e)))??;

        debug!("Stored {} new readings", inserted);
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

fn insert_records(conn: &Connection, records: &[SinkRecord]) -> Result<usize, SinkWriteError> {
    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0;

    for record in records {
        let key = record.dedup_key();
        let reading = &record.reading;
        let m = reading.measurement();

        inserted += tx.execute(
            r#"INSERT OR IGNORE INTO readings
               (dedup_key, timestamp, sensor_id, format, sequence, displacement_mm, tilt_deg,
                temperature_c, humidity_pct, battery_pct, battery_mv, low_power, rssi)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"#,
            params![
                key,
                db_time(reading.received_at().wall),
                reading.sensor_id().to_string(),
                reading.format().to_string(),
                reading.sequence(),
                m.displacement_mm,
                m.tilt_deg,
                m.temperature_c,
                m.humidity_pct,
                m.battery_pct,
                m.battery_mv,
                m.low_power,
                reading.rssi()
            ],
        )?;

        for event in &record.events {
            tx.execute(
                r#"INSERT OR IGNORE INTO events
                   (id, reading_key, timestamp, sensor_id, event_type, risk_level, data)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                params![
                    event.id.to_string(),
                    key,
                    db_time(event.timestamp),
                    event.sensor_id.to_string(),
                    event.kind.name(),
                    event.risk_level().map(|l| l.to_string()),
                    serde_json::to_string(&event.kind)?
                ],
            )?;
        }
    }

    tx.commit()?;
    Ok(inserted)
}

fn db_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone)]
pub struct StoredReading {
    pub id: i64,
    pub timestamp: String,
    pub sensor_id: String,
    pub sequence: Option<u16>,
    pub displacement_mm: f64,
    pub temperature_c: f64,
    pub battery_pct: u8,
    pub low_power: bool,
}

#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub id: String,
    pub timestamp: String,
    pub sensor_id: String,
    pub event_type: String,
    pub risk_level: Option<String>,
    pub data: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub reading_count: usize,
    pub event_count: usize,
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::analysis::{DerivedEvent, EventKind, RiskLevel};
    use crate::sink::testing::{record, SENSOR};

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        (start, start + chrono::Duration::days(1))
    }

    #[tokio::test]
    async fn test_write_batch_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&DatabaseConfig {
            enabled: true,
            path: dir.path().join("data").join("test.db"),
            retention_days: 30,
        })
        .unwrap();

        let mut first = record(1);
        first.events.push(DerivedEvent::new(
            &first.reading,
            EventKind::RiskLevelChanged {
                previous: RiskLevel::Normal,
                level: RiskLevel::Elevated,
                score_mm_per_hour: 1.2,
            },
        ));
        let batch = vec![first, record(2)];

        db.write_batch(&batch).await.unwrap();
        db.write_batch(&batch).await.unwrap();

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.reading_count, 2);
        assert_eq!(stats.event_count, 1);

        let (start, end) = window();
        let events = db.query_events(start, end, None).unwrap();
        assert_eq!(events[0].event_type, "risk_level_changed");
        assert_eq!(events[0].risk_level.as_deref(), Some("elevated"));
    }

    #[test]
    fn test_query_readings_by_sensor() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.store_records(&[record(1), record(2), record(3)]).unwrap(), 3);

        let (start, end) = window();
        let readings = db.query_readings(start, end, Some(SENSOR), None).unwrap();
        let sequences: Vec<_> = readings.iter().filter_map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![3, 2, 1]);

        let other = SensorId::new([1, 2, 3, 4, 5, 6]);
        assert!(db.query_readings(start, end, Some(other), None).unwrap().is_empty());
        assert_eq!(db.query_readings(start, end, None, Some(1)).unwrap().len(), 1);
    }

    fn record_at(seq: u16, wall: DateTime<Utc>) -> SinkRecord {
        use std::time::Duration;

        use crate::codec::{decode, testing::v4_payload};
        use crate::sensors::{ReceivedAt, Reading};

        let decoded = decode(&v4_payload(seq, 0, 0)).unwrap();
        let reading = Reading::from_decoded(SENSOR, &decoded, -60, ReceivedAt::new(Duration::ZERO, wall));
        SinkRecord::new(reading, Vec::new())
    }

    #[test]
    fn test_cleanup_removes_old_rows() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.store_records(&[record_at(1, now - chrono::Duration::days(10)), record_at(2, now)])
            .unwrap();

        assert_eq!(db.cleanup(5).unwrap(), 1);
        assert_eq!(db.get_stats().unwrap().reading_count, 1);
    }

    #[test]
    fn test_locations_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        db.set_location(SENSOR, &Location::new(Site::Crawlspace, "north pier")).unwrap();

        assert_eq!(
            db.location(SENSOR).unwrap(),
            Some(Location::new(Site::Crawlspace, "north pier"))
        );
        assert_eq!(db.locations().unwrap().len(), 1);
        assert_eq!(db.location(SensorId::new([0; 6])).unwrap(), None);
    }
}
