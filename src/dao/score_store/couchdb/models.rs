use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const FINAL_PREFIX: &str = "final::";
pub const SUBJECT_PREFIX: &str = "subject::";
pub const ACCOUNT_PREFIX: &str = "account::";

/// CouchDB envelope around a stored entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDocument<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

impl<T> CouchDocument<T> {
    pub fn new(id: String, body: T) -> Self {
        Self {
            id,
            rev: None,
            body,
        }
    }
}

pub fn final_doc_id(account_id: Uuid, subject_id: Uuid) -> String {
    format!("{FINAL_PREFIX}{account_id}::{subject_id}")
}

pub fn subject_doc_id(account_id: Uuid, subject_id: Uuid) -> String {
    format!("{SUBJECT_PREFIX}{account_id}::{subject_id}")
}

pub fn account_doc_id(account_id: Uuid) -> String {
    format!("{ACCOUNT_PREFIX}{account_id}")
}
