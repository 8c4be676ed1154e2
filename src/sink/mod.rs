// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/atticguard

//! Storage sinks - where accepted readings and derived events end up
//!
//! Every sink must be idempotent on [`SinkRecord::dedup_key`]: the writer
//! re-offers a whole batch after a failure, so part of it may already be
//! stored.

mod export;
mod writer;

pub use export::JsonLinesSink;
pub use writer::{SinkWriter, SinkWriterReport};

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::analysis::DerivedEvent;
use crate::sensors::Reading;

/// An accepted reading and the events it produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinkRecord {
    pub reading: Reading,
    pub events: Vec<DerivedEvent>,
}

impl SinkRecord {
    pub fn new(reading: Reading, events: Vec<DerivedEvent>) -> Self {
        Self { reading, events }
    }

    /// `sensor|sequence|receipt-ms`, with `-` for readings without a sequence
    pub fn dedup_key(&self) -> String {
        let sequence = self
            .reading
            .sequence()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{}|{}|{}",
            self.reading.sensor_id(),
            sequence,
            self.reading.received_at().wall.timestamp_millis()
        )
    }
}

/// A failed sink write. Always retryable.
#[derive(Error, Debug)]
pub enum SinkWriteError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Unavailable(String),
}

/// Durable destination for sink records
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Store a batch. Records already stored must be skipped, not duplicated.
    async fn write_batch(&self, records: &[SinkRecord]) -> Result<(), SinkWriteError>;

    fn name(&self) -> &str;
}

/// In-memory sink for tests and embedding
#[derive(Default)]
pub struct MemorySink {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    keys: HashSet<String>,
    records: Vec<SinkRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored records in arrival order
    pub fn records(&self) -> Vec<SinkRecord> {
        self.inner.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageSink for MemorySink {
    async fn write_batch(&self, records: &[SinkRecord]) -> Result<(), SinkWriteError> {
        let mut inner = self.inner.lock();
        for record in records {
            if inner.keys.insert(record.dedup_key()) {
                inner.records.push(record.clone());
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
