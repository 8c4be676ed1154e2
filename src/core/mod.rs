//! Core module - advertisement intake and the ingestion pipeline

mod advertisement;
pub mod capture;
mod pipeline;
mod sequence;
mod session;

pub use advertisement::RawAdvertisement;
pub use pipeline::{IngestOutcome, IngestPipeline, IngestStats, IngestStatsSnapshot, RejectReason};
pub use sequence::{is_forward, HALF_RANGE};
pub use session::{run_session, ReplayRun};
