use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use famreg_core::{DocPath, FieldValue};
use famreg_engine::{EngineConfig, EngineError};
use famreg_storage::{DocumentStore, SqliteDocumentStore, StorageError};

use crate::TestSession;

/// One document store shared by several sessions, each with its own cache.
#[derive(Clone)]
pub struct SharedDocuments(Rc<RefCell<SqliteDocumentStore>>);

impl SharedDocuments {
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self(Rc::new(RefCell::new(
            SqliteDocumentStore::open_in_memory()?,
        ))))
    }

    pub fn leaf_count(&self) -> Result<u64, StorageError> {
        self.0.borrow().leaf_count()
    }
}

impl DocumentStore for SharedDocuments {
    fn get(&self, path: &DocPath) -> Result<Option<FieldValue>, StorageError> {
        self.0.borrow().get(path)
    }

    fn update(
        &mut self,
        root: &DocPath,
        writes: &BTreeMap<DocPath, FieldValue>,
    ) -> Result<(), StorageError> {
        self.0.borrow_mut().update(root, writes)
    }

    fn push(&mut self, parent: &DocPath) -> Result<String, StorageError> {
        self.0.borrow_mut().push(parent)
    }
}

/// Several editing sessions against one backend, e.g. two officers on
/// different devices.
pub struct TestDirectory {
    backend: SharedDocuments,
    sessions: Vec<TestSession>,
}

impl TestDirectory {
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            backend: SharedDocuments::open_in_memory()?,
            sessions: Vec::new(),
        })
    }

    pub fn backend(&self) -> &SharedDocuments {
        &self.backend
    }

    pub fn add_session(&mut self) -> Result<usize, EngineError> {
        let session = TestSession::attached(self.backend.clone(), EngineConfig::default())?;
        let index = self.sessions.len();
        self.sessions.push(session);
        Ok(index)
    }

    pub fn session(&self, index: usize) -> &TestSession {
        &self.sessions[index]
    }

    pub fn session_mut(&mut self, index: usize) -> &mut TestSession {
        &mut self.sessions[index]
    }
}
