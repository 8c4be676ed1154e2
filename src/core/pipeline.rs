// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/atticguard

//! Ingestion pipeline - decode, order, record, analyze, forward

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::sequence::is_forward;
use super::RawAdvertisement;
use crate::analysis::AnalysisEngine;
use crate::codec::{decode_manufacturer_data, DecodeError};
use crate::config::IngestConfig;
use crate::sensors::{Reading, SensorRecord, SensorRegistry};
use crate::sink::SinkRecord;

/// Why an advertisement produced no reading
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
}

/// Result of ingesting one advertisement
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Accepted(Reading),
    Duplicate,
    Rejected(RejectReason),
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted(_))
    }
}

/// Pipeline counters
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    accepted: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
    events: AtomicU64,
    queue_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStatsSnapshot {
    pub received: u64,
    pub accepted: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub events: u64,
    pub queue_failures: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            queue_failures: self.queue_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Turns raw advertisements into ordered sink records.
///
/// `ingest` may be called from any number of tasks. Calls for the same
/// sensor are serialized on that sensor's registry lock, which is held
/// until the record is queued, so per-sensor output order matches
/// acceptance order.
///
/// The outbox is unbounded and `ingest` never waits on it.
/// During a long sink outage accepted records pile up there in memory
/// until the writer delivers them or hands them back on shutdown.
pub struct IngestPipeline {
    config: IngestConfig,
    registry: Arc<SensorRegistry>,
    analysis: Arc<AnalysisEngine>,
    outbox: mpsc::UnboundedSender<SinkRecord>,
    stats: IngestStats,
}

impl IngestPipeline {
    pub fn new(
        config: IngestConfig,
        registry: Arc<SensorRegistry>,
        analysis: Arc<AnalysisEngine>,
        outbox: mpsc::UnboundedSender<SinkRecord>,
    ) -> Self {
        Self {
            config,
            registry,
            analysis,
            outbox,
            stats: IngestStats::default(),
        }
    }

    pub fn registry(&self) -> &Arc<SensorRegistry> {
        &self.registry
    }

    pub fn analysis(&self) -> &Arc<AnalysisEngine> {
        &self.analysis
    }

    pub fn stats(&self) -> IngestStatsSnapshot {
        self.stats.snapshot()
    }

    /// Process one advertisement
    pub fn ingest(&self, adv: RawAdvertisement) -> IngestOutcome {
        IngestStats::bump(&self.stats.received, 1);

        let decoded = match decode_manufacturer_data(&adv.manufacturer_data, self.config.company_id) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!("Dropping advertisement from {}: {} [{}]", adv.address, e, adv.hex_prefix(8));
                IngestStats::bump(&self.stats.rejected, 1);
                return IngestOutcome::Rejected(e.into());
            }
        };

        let reading = Reading::from_decoded(adv.address, &decoded, adv.rssi, adv.received_at);
        let handle = self.registry.lookup_or_create(adv.address, adv.received_at.wall);
        let mut record = handle.lock();

        if !self.admit(&record, &reading) {
            record.note_duplicate();
            IngestStats::bump(&self.stats.duplicates, 1);
            return IngestOutcome::Duplicate;
        }

        record.accept(reading.clone());
        let events = self.analysis.analyze(&reading);
        IngestStats::bump(&self.stats.accepted, 1);
        IngestStats::bump(&self.stats.events, events.len() as u64);

        if self.outbox.send(SinkRecord::new(reading.clone(), events)).is_err() {
            warn!("Sink queue closed, record for {} not forwarded", reading.sensor_id());
            IngestStats::bump(&self.stats.queue_failures, 1);
        }
        drop(record);

        IngestOutcome::Accepted(reading)
    }

    /// Consume a source until it closes
    pub async fn run(&self, mut source: mpsc::Receiver<RawAdvertisement>) {
        while let Some(adv) = source.recv().await {
            self.ingest(adv);
        }
        info!("Advertisement source closed");
    }

    fn admit(&self, record: &SensorRecord, reading: &Reading) -> bool {
        let Some(last) = record.last_reading.as_ref() else {
            return true;
        };
        // Only a strictly later receipt can stand in for a sequence number
        let newer = reading.received_at().monotonic > last.received_at().monotonic;
        let silence = reading
            .received_at()
            .monotonic
            .saturating_sub(last.received_at().monotonic);

        match (reading.sequence(), record.last_sequence) {
            (Some(next), Some(prev)) => {
                if is_forward(prev, next) {
                    return true;
                }
                match self.config.sequence_resync_after() {
                    Some(resync) if newer && silence >= resync => {
                        warn!(
                            "{} silent for {:?}, resyncing sequence {} -> {}",
                            record.sensor_id, silence, prev, next
                        );
                        true
                    }
                    _ => false,
                }
            }
            (Some(_), None) => true,
            (None, _) => newer && silence >= self.config.min_inter_arrival(),
        }
    }
}
