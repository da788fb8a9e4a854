//! Review log for lines the oracle could not answer.
//!
//! Such lines are resolved to "No Attack" so processing can continue, but
//! the verdict is not memorized. Each one is appended here as a single JSON
//! line so an operator can re-check it later.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::category::Category;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    /// ISO 8601 timestamp.
    pub timestamp: String,
    pub line: String,
    /// Category the line was resolved to in the meantime.
    pub resolved_as: Category,
    pub reason: String,
    pub attempts: u32,
}

impl ReviewEntry {
    pub fn new(line: impl Into<String>, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            line: line.into(),
            resolved_as: Category::NoAttack,
            reason: reason.into(),
            attempts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReviewLog {
    path: PathBuf,
}

impl ReviewLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry.
    pub async fn append(&self, entry: &ReviewEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry).context("failed to serialize review entry")?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open review log: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .context("failed to write review entry")?;
        file.flush().await?;

        debug!(path = %self.path.display(), "review entry appended");
        Ok(())
    }

    /// All entries; unreadable lines are skipped. A missing file is empty.
    pub async fn read_all(&self) -> Result<Vec<ReviewEntry>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read review log: {}", self.path.display()))
            }
        };

        let mut entries = Vec::new();
        for (n, raw) in content.lines().enumerate() {
            if raw.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(raw) {
                Ok(e) => entries.push(e),
                Err(e) => warn!(line = n + 1, error = %e, "skipping unreadable review entry"),
            }
        }
        Ok(entries)
    }
}
