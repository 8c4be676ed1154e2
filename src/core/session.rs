//! Replay sessions - one source run through the pipeline into a sink

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{error, warn};

use super::capture::CaptureReport;
use super::{IngestPipeline, IngestStatsSnapshot, RawAdvertisement};
use crate::sink::{SinkRecord, SinkWriter, SinkWriterReport};

const SOURCE_DEPTH: usize = 1024;

/// Everything a finished session hands back
#[derive(Debug)]
pub struct ReplayRun {
    /// Source report, if the source ran to completion
    pub capture: Option<CaptureReport>,
    /// First failure seen by the source or a session task
    pub error: Option<anyhow::Error>,
    pub interrupted: bool,
    pub stats: IngestStatsSnapshot,
    pub sink: SinkWriterReport,
}

impl ReplayRun {
    /// The session error, if any, once the caller has dealt with the report
    pub fn into_result(self) -> Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Drive `source` through `pipeline` and drain everything it accepts into
/// `writer`.
///
/// A failing source does not cut the session short: readings already
/// accepted still go through the writer, and the error comes back in the
/// run. The first `interrupt` stops the source and tells the writer to give
/// up on retries. A second one while the writer is still draining abandons
/// delivery. Either way, whatever the sink never confirmed is returned in
/// `sink.undelivered`.
pub async fn run_session<S, SFut, I, IFut>(
    pipeline: IngestPipeline,
    writer: SinkWriter,
    queue: mpsc::UnboundedReceiver<SinkRecord>,
    source: S,
    interrupt: I,
) -> ReplayRun
where
    S: FnOnce(mpsc::Sender<RawAdvertisement>) -> SFut,
    SFut: Future<Output = Result<CaptureReport>> + Send + 'static,
    I: Fn() -> IFut,
    IFut: Future<Output = ()>,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut writer = tokio::spawn(writer.run(queue, shutdown_rx));

    let pipeline = Arc::new(pipeline);
    let (tx, rx) = mpsc::channel(SOURCE_DEPTH);
    let ingest = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.run(rx).await })
    };
    let mut feed = tokio::spawn(source(tx));

    let mut error = None;
    let mut capture = None;
    let interrupted = tokio::select! {
        joined = &mut feed => {
            match joined {
                Ok(Ok(report)) => capture = Some(report),
                Ok(Err(e)) => {
                    error!("Source failed, draining accepted readings: {:#}", e);
                    error = Some(e);
                }
                Err(e) => error = Some(e.into()),
            }
            false
        }
        _ = interrupt() => {
            warn!("Interrupted, stopping replay");
            feed.abort();
            true
        }
    };

    // Source closed: in-flight ingests finish, then the outbound queue closes
    if let Err(e) = ingest.await {
        error.get_or_insert(e.into());
    }
    let stats = pipeline.stats();
    drop(pipeline);

    if interrupted {
        let _ = shutdown_tx.send(true);
    }
    let joined = tokio::select! {
        joined = &mut writer => Some(joined),
        _ = interrupt() => None,
    };
    let joined = match joined {
        Some(joined) => joined,
        None => {
            warn!("Abandoning sink delivery");
            let _ = shutdown_tx.send(true);
            writer.await
        }
    };
    let sink = match joined {
        Ok(report) => report,
        Err(e) => {
            error.get_or_insert(e.into());
            SinkWriterReport::default()
        }
    };

    ReplayRun {
        capture,
        error,
        interrupted,
        stats,
        sink,
    }
}
