//! Cached mirror of every record, stored under a single cache key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use famreg_core::{Record, RecordId};
use famreg_storage::{Cache, StorageError};

use crate::codec::{decode, encode};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotContainer {
    #[serde(default)]
    pub records: BTreeMap<RecordId, Record>,
}

/// Reads the snapshot. Missing or undecodable content is an empty
/// snapshot; only cache I/O failures are errors.
pub fn read<C: Cache>(cache: &C, key: &str) -> Result<BTreeMap<RecordId, Record>, StorageError> {
    let Some(bytes) = cache.get_item(key)? else {
        debug!(key, "no cached snapshot");
        return Ok(BTreeMap::new());
    };
    match decode::<SnapshotContainer>(&bytes) {
        Ok(container) => {
            debug!(key, records = container.records.len(), "loaded cached snapshot");
            Ok(container.records)
        }
        Err(e) => {
            warn!(key, error = %e, "cached snapshot is malformed, treating as empty");
            Ok(BTreeMap::new())
        }
    }
}

/// Reads the snapshot, degrading every failure to an empty map.
pub fn load<C: Cache>(cache: &C, key: &str) -> BTreeMap<RecordId, Record> {
    read(cache, key).unwrap_or_else(|e| {
        warn!(key, error = %e, "could not read cached snapshot, treating as empty");
        BTreeMap::new()
    })
}

pub fn write<C: Cache>(
    cache: &mut C,
    key: &str,
    records: BTreeMap<RecordId, Record>,
) -> Result<(), StorageError> {
    let count = records.len();
    cache.set_item(key, &encode(&SnapshotContainer { records })?)?;
    debug!(key, records = count, "wrote snapshot");
    Ok(())
}

/// Replaces one record in the snapshot.
pub fn put_record<C: Cache>(cache: &mut C, key: &str, record: Record) -> Result<(), StorageError> {
    let mut records = read(cache, key)?;
    records.insert(record.id.clone(), record);
    write(cache, key, records)
}

/// Removes records from the snapshot; returns how many were present.
pub fn remove_records<C: Cache>(
    cache: &mut C,
    key: &str,
    ids: &[RecordId],
) -> Result<usize, StorageError> {
    let mut records = read(cache, key)?;
    let removed = ids.iter().filter(|id| records.remove(*id).is_some()).count();
    write(cache, key, records)?;
    Ok(removed)
}
