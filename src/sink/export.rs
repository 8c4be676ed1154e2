//! JSON-lines file sink, also used to spill undelivered records

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use super::{SinkRecord, SinkWriteError, StorageSink};

/// Appends one JSON object per record.
///
/// Dedup only looks back one batch: a retried batch is not written twice,
/// but memory stays flat over long runs. A record offered again after later
/// batches succeeded is appended again, and readers key on `dedup_key`.
pub struct JsonLinesSink {
    path: PathBuf,
    state: Mutex<ExportState>,
}

struct ExportState {
    writer: BufWriter<File>,
    /// Keys of the last batch, plus whatever earlier failed attempts wrote
    recent: HashSet<String>,
    count: usize,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating parent directories
    pub fn open(path: &Path) -> Result<Self, SinkWriteError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!("Exporting records to {:?}", path);

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(ExportState {
                writer: BufWriter::new(file),
                recent: HashSet::new(),
                count: 0,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written through this handle
    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    /// Append records the previous batch did not already write. Returns how many.
    pub fn append(&self, records: &[SinkRecord]) -> Result<usize, SinkWriteError> {
        let mut state = self.state.lock();
        let mut batch = HashSet::with_capacity(records.len());

        match write_new(&mut state, records, &mut batch) {
            Ok(appended) => {
                state.recent = batch;
                Ok(appended)
            }
            Err(e) => {
                state.recent.extend(batch);
                Err(e)
            }
        }
    }
}

fn write_new(
    state: &mut ExportState,
    records: &[SinkRecord],
    batch: &mut HashSet<String>,
) -> Result<usize, SinkWriteError> {
    let mut appended = 0;

    for record in records {
        let key = record.dedup_key();
        if state.recent.contains(&key) || batch.contains(&key) {
            batch.insert(key);
            continue;
        }
        let json = serde_json::to_string(record)?;
        writeln!(state.writer, "{}", json)?;
        batch.insert(key);
        state.count += 1;
        appended += 1;
    }

    state.writer.flush()?;
    Ok(appended)
}

#[async_trait]
impl StorageSink for JsonLinesSink {
    async fn write_batch(&self, records: &[SinkRecord]) -> Result<(), SinkWriteError> {
        self.append(records).map(|_| ())
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}
