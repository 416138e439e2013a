#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{AccountEntity, FinalScoresEntity, SubjectEntity},
    storage::StorageResult,
};

/// Abstraction over the durable side of live scoring: final scores, subjects and accounts.
pub trait ScoreStore: Send + Sync {
    /// Store the final scores of a subject. Writing the same subject twice replaces the record.
    fn persist_final_scores(&self, scores: FinalScoresEntity)
    -> BoxFuture<'static, StorageResult<()>>;
    fn find_final_scores(
        &self,
        account_id: Uuid,
        subject_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<FinalScoresEntity>>>;
    fn find_subject(
        &self,
        account_id: Uuid,
        subject_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SubjectEntity>>>;
    fn find_account(&self, account_id: Uuid)
    -> BoxFuture<'static, StorageResult<Option<AccountEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
