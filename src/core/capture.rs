//! Capture files - recorded advertisements, one JSON object per line

use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::RawAdvertisement;

/// Outcome of replaying one capture file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureReport {
    pub lines: usize,
    pub sent: usize,
    pub skipped: usize,
}

/// Parse one capture line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Option<serde_json::Result<RawAdvertisement>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Feed every advertisement in `path` into `tx`, in file order.
///
/// Unparseable lines, including ones that are not UTF-8, are logged and
/// skipped. Stops early if the receiver goes away.
pub async fn replay(path: &Path, tx: mpsc::Sender<RawAdvertisement>) -> Result<CaptureReport> {
    let file = File::open(path)
        .await
        .with_context(|| format!("Failed to open capture {:?}", path))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut report = CaptureReport::default();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .with_context(|| format!("Failed to read capture {:?}", path))?;
        if read == 0 {
            break;
        }
        report.lines += 1;

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                warn!("Skipping capture line {}: {}", report.lines, e);
                report.skipped += 1;
                continue;
            }
        };
        match parse_line(line) {
            None => {}
            Some(Ok(adv)) => {
                if tx.send(adv).await.is_err() {
                    warn!("Pipeline closed, stopping replay at line {}", report.lines);
                    break;
                }
                report.sent += 1;
            }
            Some(Err(e)) => {
                warn!("Skipping capture line {}: {}", report.lines, e);
                report.skipped += 1;
            }
        }
    }

    info!(
        "Replayed {:?}: {} advertisements, {} skipped",
        path, report.sent, report.skipped
    );
    Ok(report)
}
