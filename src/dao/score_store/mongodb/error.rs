use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Failures of the MongoDB score store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("MongoDB setting `{0}` is not set")]
    MissingSetting(&'static str),
    #[error("MongoDB URI is invalid")]
    InvalidUri(#[source] MongoError),
    #[error("cannot build the MongoDB client")]
    Client(#[source] MongoError),
    /// The deployment never answered a ping while connecting.
    #[error("MongoDB did not answer after {attempts} ping(s)")]
    Unreachable {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed")]
    Ping(#[source] MongoError),
    /// A driver call on `collection` failed; `action` names what was attempted.
    #[error("MongoDB {action} on `{collection}` failed")]
    Operation {
        action: &'static str,
        collection: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("stored document `{id}` in `{collection}` is invalid: {reason}")]
    DecodeDocument {
        collection: &'static str,
        id: String,
        reason: String,
    },
}

impl MongoDaoError {
    pub(super) fn operation(
        action: &'static str,
        collection: &'static str,
    ) -> impl FnOnce(MongoError) -> Self {
        move |source| MongoDaoError::Operation {
            action,
            collection,
            source,
        }
    }
}
