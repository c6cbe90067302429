//! Pending edit history, stored under a single cache key.

use tracing::debug;

use famreg_core::EditHistory;
use famreg_storage::{Cache, StorageError};

use crate::codec::{decode, encode};

/// Unlike the snapshot, an unreadable history is an error: treating it as
/// empty would lose pending changes on the next write.
pub fn read<C: Cache>(cache: &C, key: &str) -> Result<EditHistory, StorageError> {
    match cache.get_item(key)? {
        Some(bytes) => decode(&bytes),
        None => Ok(EditHistory::new()),
    }
}

pub fn write<C: Cache>(cache: &mut C, key: &str, history: &EditHistory) -> Result<(), StorageError> {
    cache.set_item(key, &encode(history)?)?;
    debug!(key, records = history.len(), fields = history.field_count(), "wrote edit history");
    Ok(())
}

pub fn clear<C: Cache>(cache: &mut C, key: &str) -> Result<(), StorageError> {
    cache.remove_item(key)?;
    debug!(key, "cleared edit history");
    Ok(())
}
