use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid path segment {segment:?}: {reason}")]
    InvalidSegment {
        segment: String,
        reason: &'static str,
    },

    #[error("invalid data: {0}")]
    InvalidData(String),
}
