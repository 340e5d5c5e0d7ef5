//! Append-only archive log.

use async_trait::async_trait;
use parley_protocol::BrokerEntry;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Destination for archived lines.
#[async_trait]
pub trait ArchiveSink: Send {
    /// Durably append one line; a newline is added.
    async fn append(&mut self, line: &str) -> io::Result<()>;
}

/// A log file opened in append mode.
pub struct ArchiveLog {
    path: PathBuf,
    file: File,
}

impl ArchiveLog {
    /// Open `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self { path, file })
    }

    /// Get the log path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ArchiveSink for ArchiveLog {
    async fn append(&mut self, line: &str) -> io::Result<()> {
        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');

        self.file.write_all(record.as_bytes()).await?;
        self.file.flush().await?;
        self.file.sync_data().await
    }
}

/// What to do with a stream entry after processing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Archived; acknowledge it.
    Ack,
    /// Not archived; leave it pending for redelivery.
    Retain,
}

/// Archive one queue payload.
pub async fn process<S: ArchiveSink + ?Sized>(payload: Option<&[u8]>, sink: &mut S) -> Disposition {
    let Some(payload) = payload else {
        warn!("Entry has no payload");
        return Disposition::Retain;
    };

    let entry = match BrokerEntry::from_slice(payload) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(error = %e, "Failed to decode entry");
            return Disposition::Retain;
        }
    };

    match sink.append(&entry.log_line()).await {
        Ok(()) => {
            debug!(username = %entry.username, "Entry archived");
            Disposition::Ack
        }
        Err(e) => {
            warn!(error = %e, "Failed to write archive");
            Disposition::Retain
        }
    }
}
