//! Append-only JSON-lines audit sink.
//!
//! Every append writes one line and calls `sync_data` before returning, so an
//! acknowledged entry survives a crash. On open the existing log is replayed:
//! an unparsable final line is a torn write from a crash before fsync and is
//! truncated; an unparsable line anywhere else fails the open.
//!
//! A write that fails or is cancelled partway leaves bytes past the last
//! acknowledged line. They are cut before the next append, so a fragment never
//! ends up in the middle of the log.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::audit::entry::{AuditEntry, AuditQuery};
use crate::audit::sink::{AuditSink, SinkError};

pub struct JsonlFileSink {
    path: PathBuf,
    writer: Mutex<Writer>,
    last_sequence: Option<u64>,
    recovered: usize,
}

struct Writer {
    file: File,
    /// Length of the log up to the last acknowledged line.
    committed: u64,
}

impl Writer {
    async fn discard_partial(&mut self) -> Result<(), SinkError> {
        // Settle any write still in flight from a dropped append.
        if let Err(e) = self.file.flush().await {
            tracing::debug!(error = %e, "Pending audit write failed");
        }
        let len = self.file.metadata().await?.len();
        if len > self.committed {
            tracing::warn!(
                committed = self.committed,
                len,
                "Discarding partial audit record"
            );
            self.file.set_len(self.committed).await?;
        }
        Ok(())
    }

    async fn append_line(&mut self, line: &[u8]) -> Result<(), SinkError> {
        self.discard_partial().await?;

        let written = async {
            self.file.write_all(line).await?;
            self.file.sync_data().await
        }
        .await;

        match written {
            Ok(()) => {
                self.committed += line.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.file.set_len(self.committed).await {
                    tracing::error!(error = %rollback, "Failed to roll back partial audit record");
                }
                Err(SinkError::Io(e))
            }
        }
    }
}

impl JsonlFileSink {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();

        let (entries, truncate_to) = match tokio::fs::read_to_string(&path).await {
            Ok(content) => replay(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Vec::new(), None),
            Err(e) => return Err(SinkError::Io(e)),
        };

        if let Some(len) = truncate_to {
            tracing::warn!(path = %path.display(), offset = len, "Truncating torn tail record from audit log");
            let file = OpenOptions::new().write(true).open(&path).await?;
            file.set_len(len).await?;
            file.sync_all().await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let committed = file.metadata().await?.len();
        let last_sequence = entries.iter().map(|e| e.sequence).max();
        tracing::info!(path = %path.display(), entries = entries.len(), "Opened audit log");

        Ok(Self {
            path,
            writer: Mutex::new(Writer { file, committed }),
            last_sequence,
            recovered: entries.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest sequence number found on open.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Number of entries replayed on open.
    pub fn recovered(&self) -> usize {
        self.recovered
    }

    async fn read_all(&self) -> Result<Vec<AuditEntry>, SinkError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let (entries, _) = replay(&content)?;
        Ok(entries)
    }
}

/// Parse a log. Returns the entries and, when the last line is torn, the
/// byte offset to truncate to.
fn replay(content: &str) -> Result<(Vec<AuditEntry>, Option<u64>), SinkError> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let mut entries = Vec::with_capacity(lines.len());
    let mut offset: u64 = 0;

    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if !line.is_empty() {
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) if idx == lines.len() - 1 => {
                    tracing::debug!(line = idx + 1, error = %e, "Torn audit record");
                    return Ok((entries, Some(offset)));
                }
                Err(e) => {
                    return Err(SinkError::CorruptLog {
                        line: idx + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }
        offset += raw.len() as u64;
    }

    Ok((entries, None))
}

#[async_trait]
impl AuditSink for JsonlFileSink {
    async fn append(&self, entry: &AuditEntry) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        self.writer.lock().await.append_line(&line).await
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, SinkError> {
        // Hold the writer lock so a half-written line is never read.
        let _guard = self.writer.lock().await;
        let entries = self.read_all().await?;
        Ok(query.apply(entries.iter()))
    }
}
