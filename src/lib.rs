// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/atticguard

//! AtticGuard - structural-health telemetry ingestion
//!
//! Turns BLE advertisements from StructureNode displacement sensors into
//! validated readings, keeps per-sensor ingest state, derives motion and
//! risk events on the way in, and hands everything to durable storage.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Ingestion Pipeline                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  RawAdvertisement                                            │
//! │       ↓                                                      │
//! │  ┌─────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐  │
//! │  │  Codec  │ → │  Order / │ → │ Registry │ → │ Analysis  │  │
//! │  │ V3A/V4  │   │  Dedup   │   │  update  │   │  Engine   │  │
//! │  └─────────┘   └──────────┘   └──────────┘   └───────────┘  │
//! │                                                    ↓         │
//! │                              SinkRecord (reading + events)   │
//! │                                                    ↓         │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │           Sink Writer (batch, retry, spill)           │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       ↓                  ↓                    ↓              │
//! │  ┌─────────┐      ┌────────────┐      ┌──────────────┐      │
//! │  │ SQLite  │      │ JSON lines │      │    Memory    │      │
//! │  └─────────┘      └────────────┘      └──────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod analysis;
pub mod codec;
pub mod config;
pub mod core;
pub mod db;
pub mod sensors;
pub mod sink;

// Re-exports for convenience
pub use analysis::{AnalysisEngine, DerivedEvent, EventKind, RiskLevel};
pub use codec::{decode, decode_manufacturer_data, DecodeError, DecodedPayload, PayloadFormat};
pub use config::Config;
pub use crate::core::{IngestOutcome, IngestPipeline, RawAdvertisement};
pub use db::Database;
pub use sensors::{Reading, SensorId, SensorRegistry};
pub use sink::{SinkRecord, SinkWriter, StorageSink};

/// AtticGuard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// AtticGuard name
pub const NAME: &str = "AtticGuard";
