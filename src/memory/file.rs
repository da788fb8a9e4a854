//! JSON file backed memory.
//!
//! On disk the memory is a single JSON object mapping line text to its
//! label, in insertion order. Every `persist` rewrites the whole file through
//! a temporary sibling and an atomic rename, so a crash mid-write leaves the
//! previous version intact.

use super::{Entries, MemoryEntry, MemoryError, MemoryStore};
use crate::category::Category;
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Entries,
}

impl JsonFileStore {
    /// Load the memory at `path`. A missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "memory file not found, starting empty");
                return Ok(Self {
                    path,
                    entries: Entries::default(),
                });
            }
            Err(source) => return Err(MemoryError::Io { path, source }),
        };

        let map: Map<String, Value> =
            serde_json::from_str(&content).map_err(|e| MemoryError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let mut entries = Entries::default();
        let mut dropped = 0usize;
        for (line, value) in map {
            // Older files hold the raw oracle answer, quotes and all.
            match value.as_str().map(Category::from_oracle_text) {
                Some(label) if label != Category::Unclassifiable => entries.put(&line, label),
                _ => {
                    warn!(path = %path.display(), line = %line, value = %value, "dropping memory entry with unknown label");
                    dropped += 1;
                }
            }
        }

        info!(
            path = %path.display(),
            entries = entries.as_slice().len(),
            dropped,
            "memory loaded"
        );
        Ok(Self { path, entries })
    }

    /// Load the memory, starting empty if it cannot be read.
    ///
    /// The memory is a cache; losing it costs oracle calls, not correctness.
    /// A corrupt file is moved to `<name>.corrupt` so the next `persist`
    /// does not overwrite it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(&path) {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "memory unusable, starting with an empty cache");
                if matches!(e, MemoryError::Corrupt { .. }) {
                    let aside = sibling(&path, ".corrupt");
                    match fs::rename(&path, &aside) {
                        Ok(()) => warn!(path = %aside.display(), "corrupt memory file set aside"),
                        Err(e) => warn!(error = %e, "could not set corrupt memory file aside"),
                    }
                }
                Self {
                    path,
                    entries: Entries::default(),
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomically(&self, bytes: &[u8]) -> std::io::Result<()> {
        let tmp = sibling(&self.path, ".tmp");
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(bytes)?;
            f.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        sync_dir(parent_dir(&self.path))
    }
}

/// `path` with `suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "memory.json".into());
    name.push(suffix);
    path.with_file_name(name)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Flush the directory entry so a completed rename survives power loss.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

impl MemoryStore for JsonFileStore {
    fn get(&self, line: &str) -> Option<Category> {
        self.entries.get(line)
    }

    fn put(&mut self, line: &str, label: Category) {
        self.entries.put(line, label);
    }

    fn all(&self) -> &[MemoryEntry] {
        self.entries.as_slice()
    }

    fn persist(&self) -> Result<(), MemoryError> {
        let map: Map<String, Value> = self
            .entries
            .as_slice()
            .iter()
            .map(|e| (e.line.clone(), Value::String(e.label.label().to_string())))
            .collect();

        let bytes = serde_json::to_vec_pretty(&map).map_err(|e| MemoryError::Persist {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        self.write_atomically(&bytes)
            .map_err(|source| MemoryError::Persist {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), entries = map.len(), "memory persisted");
        Ok(())
    }
}
