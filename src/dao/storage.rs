use std::error::Error as StdError;

use thiserror::Error;

type BoxedCause = Box<dyn StdError + Send + Sync>;

pub type StorageResult<T> = Result<T, StorageError>;

/// Backend-neutral failure of a score store call.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not serve the call; a reconnect may fix it.
    #[error("score store unavailable: {context}")]
    Unavailable {
        context: String,
        #[source]
        cause: BoxedCause,
    },
    /// A record was found but does not map onto its model.
    #[error("unreadable score store record: {context}")]
    InvalidRecord {
        context: String,
        #[source]
        cause: BoxedCause,
    },
}

impl StorageError {
    pub fn unavailable(context: String, cause: impl StdError + Send + Sync + 'static) -> Self {
        Self::Unavailable {
            context,
            cause: Box::new(cause),
        }
    }

    pub fn invalid_record(context: String, cause: impl StdError + Send + Sync + 'static) -> Self {
        Self::InvalidRecord {
            context,
            cause: Box::new(cause),
        }
    }

    /// Whether retrying after a reconnect may help.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
