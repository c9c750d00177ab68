use std::collections::HashMap;

use crate::client_model::ClientRecord;

/// id → position in the in-memory collection.
///
/// Derived state: it must be rebuilt (or patched with [`ClientIndex::insert`]
/// for a plain append) after every structural change, before the next lookup.
#[derive(Debug, Default)]
pub struct ClientIndex {
    positions: HashMap<String, usize>,
}

impl ClientIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(records: &[ClientRecord]) -> Self {
        let mut index = Self::new();
        index.rebuild(records);
        index
    }

    pub fn rebuild(&mut self, records: &[ClientRecord]) {
        self.positions.clear();
        self.positions.reserve(records.len());
        for (position, record) in records.iter().enumerate() {
            self.positions.insert(record.id.clone(), position);
        }
    }

    pub fn insert(&mut self, id: &str, position: usize) {
        self.positions.insert(id.to_string(), position);
    }

    pub fn lookup(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
