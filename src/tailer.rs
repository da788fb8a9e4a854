//! Follow a growing log file and hand out complete lines in order.
//!
//! By default the tailer starts at the current end of the file, so lines
//! written before startup are never classified. A trailing line without its
//! newline is held back until the newline arrives. If the file shrinks
//! below the read position it is read again from the beginning; if the path
//! is replaced by a new file (rename+create rotation) the new file is opened
//! and read from its start. A truncation that regrows past the old position
//! within one poll interval goes unnoticed.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    Beginning,
    End,
}

pub struct LogTailer {
    path: PathBuf,
    reader: BufReader<File>,
    position: u64,
    pending: Vec<u8>,
    poll_interval: Duration,
}

impl LogTailer {
    pub async fn open(
        path: impl Into<PathBuf>,
        start: StartPosition,
        poll_interval: Duration,
    ) -> Result<Self> {
        let path = path.into();
        let mut file = File::open(&path)
            .await
            .with_context(|| format!("failed to open log source: {}", path.display()))?;

        let position = match start {
            StartPosition::Beginning => 0,
            StartPosition::End => file.seek(SeekFrom::End(0)).await?,
        };
        info!(path = %path.display(), position, "watching log source for new entries");

        Ok(Self {
            path,
            reader: BufReader::new(file),
            position,
            pending: Vec::new(),
            poll_interval,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Wait for the next complete line, without its line terminator.
    ///
    /// Returns `None` once `cancel` fires. Cancellation is observed between
    /// lines and during idle waits, never in the middle of a line.
    pub async fn next_line(&mut self, cancel: &CancellationToken) -> Result<Option<String>> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            let n = self
                .reader
                .read_until(b'\n', &mut self.pending)
                .await
                .with_context(|| format!("failed to read {}", self.path.display()))?;

            if n > 0 {
                self.position += n as u64;
                if self.pending.last() == Some(&b'\n') {
                    let raw = std::mem::take(&mut self.pending);
                    let line = String::from_utf8_lossy(&raw);
                    return Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()));
                }
                continue;
            }

            self.follow_source().await?;

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn follow_source(&mut self) -> Result<()> {
        let on_disk = match tokio::fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "log source not readable");
                return Ok(());
            }
        };

        let open = self.reader.get_ref().metadata().await?;
        if is_replaced(&on_disk, &open) {
            match File::open(&self.path).await {
                Ok(file) => {
                    info!(path = %self.path.display(), "log source rotated, reopening");
                    self.reader = BufReader::new(file);
                    self.position = 0;
                    self.pending.clear();
                }
                Err(e) => debug!(path = %self.path.display(), error = %e, "rotated log source not ready"),
            }
            return Ok(());
        }

        if on_disk.len() < self.position {
            warn!(
                path = %self.path.display(),
                len = on_disk.len(),
                position = self.position,
                "log source shrank, reading from the beginning"
            );
            self.reader.seek(SeekFrom::Start(0)).await?;
            self.position = 0;
            self.pending.clear();
        }
        Ok(())
    }
}

#[cfg(unix)]
fn is_replaced(on_disk: &std::fs::Metadata, open: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    on_disk.dev() != open.dev() || on_disk.ino() != open.ino()
}

#[cfg(not(unix))]
fn is_replaced(_on_disk: &std::fs::Metadata, _open: &std::fs::Metadata) -> bool {
    false
}
