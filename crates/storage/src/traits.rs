use std::collections::BTreeMap;

use famreg_core::{DocPath, FieldValue};

use crate::error::StorageError;

/// Local key-value cache holding the record snapshot and the edit history.
///
/// Values are opaque bytes; encoding is the caller's concern.
pub trait Cache {
    fn get_item(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn set_item(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError>;

    /// All keys currently present, sorted.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Hierarchical document store addressed by slash-delimited paths.
pub trait DocumentStore {
    /// Returns the leaf at `path`, or the subtree below it assembled as a
    /// `FieldValue::Map`. `None` when nothing is stored there.
    fn get(&self, path: &DocPath) -> Result<Option<FieldValue>, StorageError>;

    /// Applies every write or none of them. Each path must lie within
    /// `root`. A `Map` value replaces the subtree at its path; `Null`
    /// deletes it.
    fn update(
        &mut self,
        root: &DocPath,
        writes: &BTreeMap<DocPath, FieldValue>,
    ) -> Result<(), StorageError>;

    /// Generates a fresh child key under `parent` without writing anything.
    fn push(&mut self, parent: &DocPath) -> Result<String, StorageError>;
}
