use super::{Entries, MemoryEntry, MemoryError, MemoryStore};
use crate::category::Category;

/// Non-durable store. `persist` is a no-op.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    entries: Entries,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryStore for InMemoryStore {
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
        Ok(())
    }
}
