use famreg_core::{CoreError, RecordId};
use famreg_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The edit is visible in memory but could not be written to the cache.
    #[error("could not persist {key}: {source}")]
    Persist {
        key: String,
        #[source]
        source: StorageError,
    },

    /// The document store rejected the flush; pending history is intact.
    #[error("flush rejected by document store: {0}")]
    Flush(#[source] StorageError),

    #[error("record not found: {0}")]
    RecordNotFound(RecordId),
}

impl EngineError {
    pub(crate) fn persist(key: &str) -> impl FnOnce(StorageError) -> Self + '_ {
        move |source| EngineError::Persist {
            key: key.to_string(),
            source,
        }
    }

    /// `Persist` failures leave the caller's view updated and can be shown
    /// as a warning; everything else aborted the operation.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EngineError::Persist { .. })
    }
}
