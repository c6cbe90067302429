use std::cell::Cell;
use std::collections::BTreeMap;

use famreg_core::{DocPath, FieldValue};
use famreg_storage::{Cache, DocumentStore, StorageError};

/// Cache wrapper whose reads and writes can be made to fail.
pub struct FlakyCache<C> {
    inner: C,
    fail_reads: bool,
    fail_writes: bool,
    /// Reads still to fail before `fail_reads` applies again.
    failing_reads: Cell<u32>,
}

impl<C: Cache> FlakyCache<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            fail_reads: false,
            fail_writes: false,
            failing_reads: Cell::new(0),
        }
    }

    pub fn fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Fails only the next `count` reads.
    pub fn fail_next_reads(&mut self, count: u32) {
        self.failing_reads.set(count);
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    fn check(&self, failing: bool, op: &str) -> Result<(), StorageError> {
        let pending = self.failing_reads.get();
        if op == "read" && pending > 0 {
            self.failing_reads.set(pending - 1);
            return Err(StorageError::Unavailable(format!("injected cache {op} failure")));
        }
        if failing {
            return Err(StorageError::Unavailable(format!("injected cache {op} failure")));
        }
        Ok(())
    }
}

impl<C: Cache> Cache for FlakyCache<C> {
    fn get_item(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.check(self.fail_reads, "read")?;
        self.inner.get_item(key)
    }

    fn set_item(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.check(self.fail_writes, "write")?;
        self.inner.set_item(key, value)
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        self.check(self.fail_writes, "write")?;
        self.inner.remove_item(key)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.check(self.fail_reads, "read")?;
        self.inner.keys()
    }
}

/// Document store wrapper that records every multi-path update it receives
/// and can be made to reject them.
pub struct FlakyDocuments<D> {
    inner: D,
    reject_updates: bool,
    updates: Vec<BTreeMap<DocPath, FieldValue>>,
}

impl<D: DocumentStore> FlakyDocuments<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            reject_updates: false,
            updates: Vec::new(),
        }
    }

    pub fn reject_updates(&mut self, reject: bool) {
        self.reject_updates = reject;
    }

    /// Updates that reached the inner store, in order.
    pub fn updates(&self) -> &[BTreeMap<DocPath, FieldValue>] {
        &self.updates
    }

    pub fn clear_updates(&mut self) {
        self.updates.clear();
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: DocumentStore> DocumentStore for FlakyDocuments<D> {
    fn get(&self, path: &DocPath) -> Result<Option<FieldValue>, StorageError> {
        self.inner.get(path)
    }

    fn update(
        &mut self,
        root: &DocPath,
        writes: &BTreeMap<DocPath, FieldValue>,
    ) -> Result<(), StorageError> {
        if self.reject_updates {
            return Err(StorageError::Unavailable(
                "injected document store rejection".into(),
            ));
        }
        self.inner.update(root, writes)?;
        self.updates.push(writes.clone());
        Ok(())
    }

    fn push(&mut self, parent: &DocPath) -> Result<String, StorageError> {
        self.inner.push(parent)
    }
}
