// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/atticguard

//! Batching, retrying sink writer

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{SinkRecord, StorageSink};
use crate::config::SinkConfig;

/// What the writer did before it stopped
#[derive(Debug, Default)]
pub struct SinkWriterReport {
    pub delivered: u64,
    pub failed_attempts: u64,
    /// Records never confirmed by the sink, in queue order
    pub undelivered: Vec<SinkRecord>,
}

/// Drains the pipeline's outbound queue into a [`StorageSink`]
pub struct SinkWriter {
    sink: Arc<dyn StorageSink>,
    config: SinkConfig,
}

impl SinkWriter {
    pub fn new(sink: Arc<dyn StorageSink>, config: SinkConfig) -> Self {
        Self { sink, config }
    }

    /// Run until the queue closes or `shutdown` turns true.
    ///
    /// A closed queue is drained and delivered first. On shutdown, retrying
    /// stops and everything still pending is handed back in the report.
    pub async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<SinkRecord>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SinkWriterReport {
        info!("Sink writer started ({})", self.sink.name());
        let mut report = SinkWriterReport::default();
        let mut consecutive_failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                return self.abandon(report, Vec::new(), &mut rx);
            }

            // Block for the first record, then fill until size or deadline
            let first = tokio::select! {
                maybe = rx.recv() => maybe,
                _ = shutdown_signal(&mut shutdown) => {
                    return self.abandon(report, Vec::new(), &mut rx);
                }
            };
            let Some(first) = first else {
                info!(
                    "Sink writer finished: {} delivered, {} failed attempts",
                    report.delivered, report.failed_attempts
                );
                return report;
            };

            let mut batch = vec![first];
            let deadline = Instant::now() + self.config.flush_interval();
            while batch.len() < self.config.batch_size {
                tokio::select! {
                    maybe = rx.recv() => match maybe {
                        Some(record) => batch.push(record),
                        None => break,
                    },
                    _ = tokio::time::sleep_until(deadline) => break,
                    _ = shutdown_signal(&mut shutdown) => {
                        return self.abandon(report, batch, &mut rx);
                    }
                }
            }

            loop {
                match self.sink.write_batch(&batch).await {
                    Ok(()) => {
                        if consecutive_failures > 0 {
                            info!("{} sink recovered after {} failures", self.sink.name(), consecutive_failures);
                        }
                        consecutive_failures = 0;
                        report.delivered += batch.len() as u64;
                        debug!("Delivered {} records to {}", batch.len(), self.sink.name());
                        break;
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        report.failed_attempts += 1;
                        let delay = self.backoff(consecutive_failures);

                        if consecutive_failures >= self.config.alert_after_failures {
                            error!(
                                "{} sink has failed {} times in a row: {} (retrying {} records in {:?})",
                                self.sink.name(),
                                consecutive_failures,
                                e,
                                batch.len(),
                                delay
                            );
                        } else {
                            warn!("{} sink write failed: {} (retry in {:?})", self.sink.name(), e, delay);
                        }

                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = shutdown_signal(&mut shutdown) => {
                                return self.abandon(report, batch, &mut rx);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Exponential backoff capped at `max_backoff`, with jitter in the upper half
    fn backoff(&self, attempt: u32) -> Duration {
        backoff_delay(
            Duration::from_millis(self.config.initial_backoff_ms),
            Duration::from_millis(self.config.max_backoff_ms),
            attempt,
        )
    }

    fn abandon(
        &self,
        mut report: SinkWriterReport,
        pending: Vec<SinkRecord>,
        rx: &mut mpsc::UnboundedReceiver<SinkRecord>,
    ) -> SinkWriterReport {
        report.undelivered = pending;
        rx.close();
        while let Ok(record) = rx.try_recv() {
            report.undelivered.push(record);
        }

        if !report.undelivered.is_empty() {
            warn!(
                "Sink writer stopped with {} undelivered records",
                report.undelivered.len()
            );
        }
        info!("Sink writer stopped: {} delivered", report.delivered);
        report
    }
}

fn backoff_delay(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = initial.saturating_mul(1 << exponent).min(max);
    let half = base / 2;
    let jitter_ms = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
    half + Duration::from_millis(jitter_ms)
}

/// Resolves once the flag is set. A dropped sender never signals.
async fn shutdown_signal(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
