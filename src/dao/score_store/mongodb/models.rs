use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::{
    dao::models::{AccountEntity, FinalScoresEntity, MemberEntity, SubjectEntity},
    state::sport::SportKind,
};

pub const FINAL_SCORES_COLLECTION: &str = "final_scores";
pub const SUBJECTS_COLLECTION: &str = "subjects";
pub const ACCOUNTS_COLLECTION: &str = "accounts";

/// Identifier of documents scoped to a subject.
pub fn subject_doc_id(account_id: Uuid, subject_id: Uuid) -> String {
    format!("{account_id}:{subject_id}")
}

pub fn doc_id(id: impl Into<String>) -> Document {
    doc! {"_id": id.into()}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoFinalScoresDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    account_id: String,
    subject_id: String,
    sport: SportKind,
    final_position: u32,
    entries: Value,
    aggregates: Value,
    version: i64,
    finalized_by: String,
    finalized_at: DateTime,
}

impl From<FinalScoresEntity> for MongoFinalScoresDocument {
    fn from(value: FinalScoresEntity) -> Self {
        Self {
            id: subject_doc_id(value.account_id, value.subject_id),
            session_id: value.session_id.to_string(),
            account_id: value.account_id.to_string(),
            subject_id: value.subject_id.to_string(),
            sport: value.sport,
            final_position: value.final_position,
            entries: value.entries,
            aggregates: value.aggregates,
            version: i64::try_from(value.version).unwrap_or(i64::MAX),
            finalized_by: value.finalized_by,
            finalized_at: DateTime::from_system_time(value.finalized_at),
        }
    }
}

impl TryFrom<MongoFinalScoresDocument> for FinalScoresEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoFinalScoresDocument) -> MongoResult<Self> {
        let parse = |field: &str| parse_uuid(FINAL_SCORES_COLLECTION, &value.id, field);
        Ok(Self {
            session_id: parse(&value.session_id)?,
            account_id: parse(&value.account_id)?,
            subject_id: parse(&value.subject_id)?,
            sport: value.sport,
            final_position: value.final_position,
            entries: value.entries.clone(),
            aggregates: value.aggregates.clone(),
            version: u64::try_from(value.version).unwrap_or_default(),
            finalized_by: value.finalized_by.clone(),
            finalized_at: value.finalized_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSubjectDocument {
    #[serde(rename = "_id")]
    id: String,
    account_id: String,
    subject_id: String,
    sport: SportKind,
    name: String,
}

impl TryFrom<MongoSubjectDocument> for SubjectEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSubjectDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(SUBJECTS_COLLECTION, &value.id, &value.subject_id)?,
            account_id: parse_uuid(SUBJECTS_COLLECTION, &value.id, &value.account_id)?,
            sport: value.sport,
            name: value.name,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAccountDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    #[serde(default)]
    public_live_scores: bool,
    #[serde(default)]
    members: Vec<MemberEntity>,
}

impl TryFrom<MongoAccountDocument> for AccountEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoAccountDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(ACCOUNTS_COLLECTION, &value.id, &value.id)?,
            name: value.name,
            public_live_scores: value.public_live_scores,
            members: value.members,
        })
    }
}

fn parse_uuid(collection: &'static str, doc_id: &str, value: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(value).map_err(|err| MongoDaoError::DecodeDocument {
        collection,
        id: doc_id.to_string(),
        reason: format!("`{value}` is not a UUID: {err}"),
    })
}
