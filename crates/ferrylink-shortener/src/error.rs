use ferrylink_core::{CoreError, StorageError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// Every candidate drawn within the attempt budget was already taken.
    #[error("no free key found after {attempts} attempts")]
    ExhaustedKeyspace { attempts: u32 },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<CoreError> for ShortenerError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidKey(message) => Self::InvalidKey(message),
        }
    }
}
