use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("path {path} is outside update root {root}")]
    PathOutsideRoot { path: String, root: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("core error: {0}")]
    Core(#[from] famreg_core::CoreError),
}
