pub mod config;
pub mod diff;
pub mod error;
pub mod flush;
pub mod history;
pub mod snapshot;

mod codec;

pub use config::EngineConfig;
pub use diff::{DiffOptions, diff_records};
pub use error::EngineError;
pub use flush::FlushReport;

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, error, info, warn};

use famreg_core::{
    DocPath, EditHistory, Fields, HistoryEntry, Member, MemberField, MemberId, Record,
    RecordField, RecordId, RecordQuery,
};
use famreg_core::path::MEMBERS_KEY;
use famreg_storage::{Cache, DocumentStore};

/// One editing session over a family directory.
///
/// Owns the cache (snapshot + edit history) and the document store, plus the
/// in-memory record list shown to the user. Saves diff the edited record
/// against the cached snapshot and accumulate deltas into the history;
/// [`Reconciler::flush`] replays those deltas as sparse field writes.
pub struct Reconciler<C: Cache, D: DocumentStore> {
    cache: C,
    documents: D,
    config: EngineConfig,
    root: DocPath,
    records: BTreeMap<RecordId, Record>,
}

impl<C: Cache, D: DocumentStore> Reconciler<C, D> {
    pub fn new(cache: C, documents: D, config: EngineConfig) -> Result<Self, EngineError> {
        let root = DocPath::parse(&config.records_root)?;
        let records = snapshot::load(&cache, &config.snapshot_key);
        info!(records = records.len(), root = %root, "reconciler ready");
        Ok(Self {
            cache,
            documents,
            config,
            root,
            records,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut C {
        &mut self.cache
    }

    pub fn documents(&self) -> &D {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut D {
        &mut self.documents
    }

    // ------------------------------------------------------------------
    // Record list
    // ------------------------------------------------------------------

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn record(&self, record_id: &RecordId) -> Option<&Record> {
        self.records.get(record_id)
    }

    pub fn search(&self, query: &RecordQuery) -> Vec<&Record> {
        self.records.values().filter(|r| query.matches(r)).collect()
    }

    /// Distinct non-empty native places, sorted.
    pub fn natives(&self) -> Vec<String> {
        self.records
            .values()
            .filter_map(|r| r.fields.get(RecordField::Native).as_text())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Reads the cached snapshot. Never fails: unreadable or malformed
    /// content yields an empty map.
    pub fn load_snapshot(&self) -> BTreeMap<RecordId, Record> {
        snapshot::load(&self.cache, &self.config.snapshot_key)
    }

    /// Replaces the in-memory list with the cached snapshot.
    pub fn reload(&mut self) {
        self.records = self.load_snapshot();
    }

    /// Rebuilds the snapshot from the document store. Returns the number of
    /// records loaded.
    pub fn refresh_from_backend(&mut self) -> Result<usize, EngineError> {
        let mut records = BTreeMap::new();
        if let Some(tree) = self.documents.get(&self.root)? {
            let entries = tree.as_map().cloned().unwrap_or_default();
            for (key, doc) in entries {
                let record_id = match RecordId::new(key.as_str()) {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(key = %key, error = %e, "skipping record with invalid id");
                        continue;
                    }
                };
                match Record::from_document(record_id.clone(), &doc) {
                    Ok(record) => {
                        records.insert(record_id, record);
                    }
                    Err(e) => warn!(record_id = %record_id, error = %e, "skipping malformed record"),
                }
            }
        }

        let count = records.len();
        self.records = records.clone();
        snapshot::write(&mut self.cache, &self.config.snapshot_key, records)
            .map_err(EngineError::persist(&self.config.snapshot_key))?;
        info!(records = count, "snapshot refreshed from document store");
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    /// Diffs `edited` against `original`, merges any deltas into the
    /// persisted history, and writes `edited` into the snapshot.
    ///
    /// The snapshot is written even when there is nothing to record.
    /// Returns the merged history entry for the record, or `None` when the
    /// edit produced no deltas or cancelled every pending one.
    pub fn reconcile(
        &mut self,
        original: Option<&Record>,
        edited: &Record,
    ) -> Result<Option<HistoryEntry>, EngineError> {
        let history_key = self.config.history_key.as_str();
        let merged = match diff_records(original, edited, DiffOptions::from(&self.config)) {
            None => {
                debug!(record_id = %edited.id, "no field changes");
                None
            }
            Some(entry) => {
                debug!(record_id = %edited.id, fields = entry.field_count(), "recording deltas");
                let mut pending = history::read(&self.cache, history_key)
                    .map_err(EngineError::persist(history_key))?;
                let merged = pending.merge(entry).cloned();
                history::write(&mut self.cache, history_key, &pending)
                    .map_err(EngineError::persist(history_key))?;
                merged
            }
        };

        let snapshot_key = self.config.snapshot_key.as_str();
        snapshot::put_record(&mut self.cache, snapshot_key, edited.clone())
            .map_err(EngineError::persist(snapshot_key))?;
        Ok(merged)
    }

    /// Saves an edited record. The in-memory list is updated before anything
    /// is persisted and stays updated if persisting fails.
    ///
    /// A snapshot that cannot be read fails the save instead of diffing
    /// against nothing, which would turn every field into a delta.
    pub fn save(&mut self, edited: Record) -> Result<Option<HistoryEntry>, EngineError> {
        self.records.insert(edited.id.clone(), edited.clone());

        let snapshot_key = self.config.snapshot_key.as_str();
        let result = snapshot::read(&self.cache, snapshot_key)
            .map_err(EngineError::persist(snapshot_key))
            .and_then(|cached| self.reconcile(cached.get(&edited.id), &edited));
        if let Err(e) = &result {
            warn!(record_id = %edited.id, error = %e, "edit not persisted");
        }
        result
    }

    /// Overlays `members` onto the record's members and saves it.
    pub fn save_members(
        &mut self,
        record_id: &RecordId,
        members: impl IntoIterator<Item = Member>,
    ) -> Result<Option<HistoryEntry>, EngineError> {
        let mut record = self
            .records
            .get(record_id)
            .cloned()
            .ok_or_else(|| EngineError::RecordNotFound(record_id.clone()))?;
        for member in members {
            record.members.insert(member.id.clone(), member);
        }
        self.save(record)
    }

    /// Removes records from the list and the snapshot. History is left as is.
    pub fn delete_records(&mut self, record_ids: &[RecordId]) -> Result<usize, EngineError> {
        for id in record_ids {
            self.records.remove(id);
        }
        let key = self.config.snapshot_key.as_str();
        let removed = snapshot::remove_records(&mut self.cache, key, record_ids)
            .map_err(EngineError::persist(key))?;
        info!(removed, "deleted records from snapshot");
        Ok(removed)
    }

    /// Creates a record in the document store under a freshly pushed id and
    /// adds it to the snapshot. Creation is not tracked as history.
    pub fn create_record(
        &mut self,
        fields: Fields<RecordField>,
        members: impl IntoIterator<Item = Member>,
    ) -> Result<Record, EngineError> {
        let key = self.documents.push(&self.root)?;
        let mut record = Record::new(RecordId::new(key)?);
        record.fields = fields;
        for member in members {
            record.members.insert(member.id.clone(), member);
        }

        let path = self.root.child(record.id.as_str())?;
        let writes = BTreeMap::from([(path, record.to_document())]);
        self.documents.update(&self.root, &writes)?;
        info!(record_id = %record.id, members = record.members.len(), "created record");

        self.records.insert(record.id.clone(), record.clone());
        let snapshot_key = self.config.snapshot_key.as_str();
        snapshot::put_record(&mut self.cache, snapshot_key, record.clone())
            .map_err(EngineError::persist(snapshot_key))?;
        Ok(record)
    }

    /// Adds a member to an existing record in the document store under a
    /// freshly pushed id and mirrors it into the snapshot.
    pub fn add_member(
        &mut self,
        record_id: &RecordId,
        fields: Fields<MemberField>,
    ) -> Result<Member, EngineError> {
        let mut record = self
            .records
            .get(record_id)
            .cloned()
            .ok_or_else(|| EngineError::RecordNotFound(record_id.clone()))?;

        let parent = self.root.child(record_id.as_str())?.child(MEMBERS_KEY)?;
        let member_id = MemberId::new(self.documents.push(&parent)?)?;
        let member = Member {
            id: member_id.clone(),
            fields,
        };

        let writes = BTreeMap::from([(parent.child(member_id.as_str())?, member.to_document())]);
        self.documents.update(&self.root, &writes)?;
        info!(record_id = %record_id, member_id = %member_id, "added member");

        record.members.insert(member_id, member.clone());
        self.records.insert(record_id.clone(), record.clone());
        let snapshot_key = self.config.snapshot_key.as_str();
        snapshot::put_record(&mut self.cache, snapshot_key, record)
            .map_err(EngineError::persist(snapshot_key))?;
        Ok(member)
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn history(&self) -> Result<EditHistory, EngineError> {
        Ok(history::read(&self.cache, &self.config.history_key)?)
    }

    pub fn history_for(&self, record_id: &RecordId) -> Result<Option<HistoryEntry>, EngineError> {
        Ok(self.history()?.get(record_id).cloned())
    }

    /// Drops pending history without writing anything to the document store.
    pub fn discard_history(&mut self) -> Result<(), EngineError> {
        history::clear(&mut self.cache, &self.config.history_key)?;
        info!("discarded pending edit history");
        Ok(())
    }

    /// Commits every pending delta as one atomic multi-path update, then
    /// clears the whole history. On failure the history is left untouched.
    pub fn flush(&mut self) -> Result<FlushReport, EngineError> {
        let key = self.config.history_key.as_str();
        let pending = history::read(&self.cache, key)?;
        if pending.is_empty() {
            debug!("nothing to flush");
            return Ok(FlushReport::default());
        }

        let writes = flush::project(&pending, &self.root);
        if let Err(e) = self.documents.update(&self.root, &writes) {
            error!(paths = writes.len(), error = %e, "flush failed, history kept");
            return Err(EngineError::Flush(e));
        }

        history::clear(&mut self.cache, key).map_err(EngineError::persist(key))?;
        let report = FlushReport {
            committed_fields: writes.len(),
            records: pending.len(),
        };
        info!(
            committed_fields = report.committed_fields,
            records = report.records,
            "flushed edit history"
        );
        Ok(report)
    }

    /// Keys present in the cache.
    pub fn cache_keys(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.cache.keys()?)
    }
}
