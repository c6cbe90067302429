use std::collections::BTreeMap;
use std::path::Path;

use famreg_core::{DocPath, FieldValue, HistoryEntry, Record, RecordId};
use famreg_engine::{EngineConfig, EngineError, Reconciler};
use famreg_storage::{DocumentStore, SqliteCache};

use crate::{FlakyCache, FlakyDocuments, SharedDocuments};

pub type SessionEngine = Reconciler<FlakyCache<SqliteCache>, FlakyDocuments<SharedDocuments>>;

/// One editing session: its own cache, a (possibly shared) backend.
pub struct TestSession {
    pub engine: SessionEngine,
}

impl TestSession {
    pub fn new() -> Result<Self, EngineError> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        Self::attached(SharedDocuments::open_in_memory()?, config)
    }

    pub fn attached(backend: SharedDocuments, config: EngineConfig) -> Result<Self, EngineError> {
        let cache = SqliteCache::open_in_memory()?;
        Self::from_parts(cache, backend, config)
    }

    /// A session whose cache lives in a file, so it survives reopening.
    pub fn open(
        cache_path: &Path,
        backend: SharedDocuments,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let cache = SqliteCache::open(&cache_path.to_string_lossy())?;
        Self::from_parts(cache, backend, config)
    }

    fn from_parts(
        cache: SqliteCache,
        backend: SharedDocuments,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let engine = Reconciler::new(FlakyCache::new(cache), FlakyDocuments::new(backend), config)?;
        Ok(Self { engine })
    }

    /// Writes whole records to the backend and rebuilds the snapshot from
    /// it. The seeding update is not kept in the update log.
    pub fn seed(&mut self, records: impl IntoIterator<Item = Record>) -> Result<(), EngineError> {
        let root = DocPath::parse(&self.engine.config().records_root)?;
        let mut writes = BTreeMap::new();
        for record in records {
            writes.insert(root.child(record.id.as_str())?, record.to_document());
        }
        let documents = self.engine.documents_mut();
        documents.update(&root, &writes)?;
        documents.clear_updates();
        self.engine.refresh_from_backend()?;
        Ok(())
    }

    /// Clones the in-memory record, applies `edit`, and saves it.
    pub fn edit(
        &mut self,
        record_id: &RecordId,
        edit: impl FnOnce(&mut Record),
    ) -> Result<Option<HistoryEntry>, EngineError> {
        let mut record = self
            .engine
            .record(record_id)
            .cloned()
            .ok_or_else(|| EngineError::RecordNotFound(record_id.clone()))?;
        edit(&mut record);
        self.engine.save(record)
    }

    pub fn backend_value(&self, path: &str) -> Result<Option<FieldValue>, EngineError> {
        let path = DocPath::parse(path)?;
        Ok(self.engine.documents().get(&path)?)
    }
}
