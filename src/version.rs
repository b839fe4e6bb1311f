//! Version Manager (C8, spec §4.8).
//!
//! Per-(index, doc) version counter plus a per-index sequence-number
//! generator. Same locking discipline as [`crate::scroll::ScrollManager`]:
//! a `parking_lot::RwLock<HashMap<..>>`, writer-held for mutation.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRecord {
    pub version: i64,
    pub seq_no: i64,
    pub primary_term: i64,
}

#[derive(Default)]
struct IndexState {
    next_seq_no: i64,
    docs: HashMap<String, VersionRecord>,
}

pub struct VersionManager {
    indexes: RwLock<HashMap<String, IndexState>>,
}

impl VersionManager {
    pub fn new() -> Self {
        Self { indexes: RwLock::new(HashMap::new()) }
    }

    /// Creates a fresh version record for a document: version=1, seq_no=next-per-index,
    /// primary_term=1. A document that already has a live record cannot be created again.
    pub fn create(&self, index: &str, id: &str) -> Result<VersionRecord> {
        let mut indexes = self.indexes.write();
        let state = indexes.entry(index.to_string()).or_default();
        if state.docs.contains_key(id) {
            return Err(Error::Internal(format!("document already has a live version record: {index}/{id}")));
        }
        let seq_no = state.next_seq_no;
        state.next_seq_no += 1;
        let record = VersionRecord { version: 1, seq_no, primary_term: 1 };
        state.docs.insert(id.to_string(), record);
        Ok(record)
    }

    /// Increments an existing record, or creates one at version=1 if absent
    /// (first write to a document that was never explicitly created).
    pub fn increment(&self, index: &str, id: &str) -> Result<VersionRecord> {
        let mut indexes = self.indexes.write();
        let state = indexes.entry(index.to_string()).or_default();
        let seq_no = state.next_seq_no;
        state.next_seq_no += 1;
        let record = match state.docs.get(id) {
            Some(existing) => VersionRecord { version: existing.version + 1, seq_no, primary_term: existing.primary_term },
            None => VersionRecord { version: 1, seq_no, primary_term: 1 },
        };
        state.docs.insert(id.to_string(), record);
        Ok(record)
    }

    /// Records a tombstone: returns the last known record before deletion.
    /// A subsequent `create` starts again at version=1.
    pub fn delete(&self, index: &str, id: &str) -> Result<Option<VersionRecord>> {
        let mut indexes = self.indexes.write();
        let state = indexes.entry(index.to_string()).or_default();
        Ok(state.docs.remove(id))
    }

    pub fn get(&self, index: &str, id: &str) -> Option<VersionRecord> {
        self.indexes.read().get(index).and_then(|state| state.docs.get(id).copied())
    }

    /// Fails if `expected` does not match the document's current version (optimistic
    /// concurrency control), per spec's version-conflict invariant.
    pub fn check_expected(&self, index: &str, id: &str, expected: i64) -> Result<()> {
        match self.get(index, id) {
            Some(record) if record.version == expected => Ok(()),
            Some(record) => Err(Error::VersionConflict { index: index.to_string(), id: id.to_string(), expected, found: record.version }),
            None => Err(Error::VersionConflict { index: index.to_string(), id: id.to_string(), expected, found: 0 }),
        }
    }
}

impl Default for VersionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_starts_at_version_one() {
        let mgr = VersionManager::new();
        let record = mgr.create("products", "1").unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.primary_term, 1);
    }

    #[test]
    fn double_create_is_an_error() {
        let mgr = VersionManager::new();
        mgr.create("products", "1").unwrap();
        assert!(mgr.create("products", "1").is_err());
    }

    #[test]
    fn increment_bumps_version_and_seq_no() {
        let mgr = VersionManager::new();
        let first = mgr.create("products", "1").unwrap();
        let second = mgr.increment("products", "1").unwrap();
        assert_eq!(second.version, 2);
        assert!(second.seq_no > first.seq_no);
    }

    #[test]
    fn seq_no_is_shared_across_docs_in_an_index() {
        let mgr = VersionManager::new();
        let a = mgr.create("products", "1").unwrap();
        let b = mgr.create("products", "2").unwrap();
        assert_ne!(a.seq_no, b.seq_no);
    }

    #[test]
    fn delete_returns_last_record_and_create_restarts_at_one() {
        let mgr = VersionManager::new();
        mgr.increment("products", "1").unwrap();
        let tombstone = mgr.delete("products", "1").unwrap();
        assert!(tombstone.is_some());
        assert!(mgr.get("products", "1").is_none());

        let recreated = mgr.create("products", "1").unwrap();
        assert_eq!(recreated.version, 1);
    }

    #[test]
    fn check_expected_detects_conflict() {
        let mgr = VersionManager::new();
        mgr.create("products", "1").unwrap();
        mgr.increment("products", "1").unwrap();
        let err = mgr.check_expected("products", "1", 1).unwrap_err();
        assert!(matches!(err, Error::VersionConflict { expected: 1, found: 2, .. }));
        assert!(mgr.check_expected("products", "1", 2).is_ok());
    }
}
