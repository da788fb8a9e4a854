//! Memorized answers -- the cache of already classified log lines.
//!
//! The memory is the only durable state of the system: the local model is
//! rebuilt from it, and every line that reaches a verdict is recorded here.

pub mod file;
pub mod in_memory;

pub use self::file::JsonFileStore;
pub use self::in_memory::InMemoryStore;

use crate::category::Category;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to read memory file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to persist memory to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One memorized answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub line: String,
    pub label: Category,
}

/// Key/value cache of resolved lines, keyed by exact (trimmed) line text.
pub trait MemoryStore {
    fn get(&self, line: &str) -> Option<Category>;

    /// Insert or overwrite. `Unclassifiable` is stored as `NoAttack`.
    fn put(&mut self, line: &str, label: Category);

    /// Entries in insertion order.
    fn all(&self) -> &[MemoryEntry];

    fn len(&self) -> usize {
        self.all().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the current contents durable.
    fn persist(&self) -> Result<(), MemoryError>;
}

/// Ordered entries plus an index, shared by the store implementations.
#[derive(Debug, Default, Clone)]
pub(crate) struct Entries {
    entries: Vec<MemoryEntry>,
    index: std::collections::HashMap<String, usize>,
}

impl Entries {
    pub(crate) fn get(&self, line: &str) -> Option<Category> {
        self.index.get(line).map(|&i| self.entries[i].label)
    }

    pub(crate) fn put(&mut self, line: &str, label: Category) {
        let label = label.storable();
        match self.index.get(line) {
            Some(&i) => self.entries[i].label = label,
            None => {
                self.index.insert(line.to_string(), self.entries.len());
                self.entries.push(MemoryEntry {
                    line: line.to_string(),
                    label,
                });
            }
        }
    }

    pub(crate) fn as_slice(&self) -> &[MemoryEntry] {
        &self.entries
    }
}

/// Count of entries per label, in category order.
pub fn label_counts(entries: &[MemoryEntry]) -> Vec<(Category, usize)> {
    let mut counts = std::collections::BTreeMap::new();
    for e in entries {
        *counts.entry(e.label).or_insert(0usize) += 1;
    }
    counts.into_iter().collect()
}
