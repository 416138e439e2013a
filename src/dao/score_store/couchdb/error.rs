//! Failures of the CouchDB score store.

use reqwest::StatusCode;
use thiserror::Error;

pub type CouchResult<T> = Result<T, CouchDaoError>;

#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// `COUCH_BASE_URL` (or another required setting) is absent.
    #[error("CouchDB setting `{0}` is not set")]
    MissingSetting(&'static str),
    #[error("cannot build the CouchDB HTTP client")]
    Client(#[source] reqwest::Error),
    /// The server could not be reached or the body could not be read.
    #[error("CouchDB request `{method} {path}` failed")]
    Unreachable {
        method: reqwest::Method,
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("CouchDB answered {status} to `{method} {path}`")]
    Status {
        method: reqwest::Method,
        path: String,
        status: StatusCode,
    },
    /// Another writer updated the document between our read and write.
    #[error("CouchDB revision conflict on `{0}`")]
    RevisionConflict(String),
    #[error("CouchDB document `{doc_id}` does not decode")]
    Decode {
        doc_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("CouchDB document `{doc_id}` is inconsistent: {reason}")]
    Inconsistent { doc_id: String, reason: String },
}

impl CouchDaoError {
    /// Whether the stored data itself is at fault, as opposed to the server.
    pub fn is_bad_record(&self) -> bool {
        matches!(
            self,
            CouchDaoError::Decode { .. } | CouchDaoError::Inconsistent { .. }
        )
    }
}
