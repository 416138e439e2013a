use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

use crate::dao::{
    models::{AccountEntity, FinalScoresEntity, SubjectEntity},
    score_store::ScoreStore,
    storage::{StorageError, StorageResult},
};

/// Failure raised while the in-memory store is switched offline.
#[derive(Debug, Error)]
#[error("in-memory store is offline")]
pub struct MemoryStoreOffline;

/// Process-local [`ScoreStore`], used for development runs and tests.
///
/// It can be switched offline to exercise degraded mode and failing finalizes.
#[derive(Clone, Default)]
pub struct MemoryScoreStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    accounts: DashMap<Uuid, AccountEntity>,
    subjects: DashMap<(Uuid, Uuid), SubjectEntity>,
    final_scores: DashMap<(Uuid, Uuid), FinalScoresEntity>,
    offline: AtomicBool,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account.
    pub fn insert_account(&self, account: AccountEntity) {
        self.inner.accounts.insert(account.id, account);
    }

    /// Insert or replace a subject.
    pub fn insert_subject(&self, subject: SubjectEntity) {
        self.inner
            .subjects
            .insert((subject.account_id, subject.id), subject);
    }

    /// Make every operation fail until switched back online.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of persisted final score records.
    pub fn final_scores_count(&self) -> usize {
        self.inner.final_scores.len()
    }

    fn check_online(&self) -> StorageResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            Err(StorageError::unavailable(
                "in-memory store offline".into(),
                MemoryStoreOffline,
            ))
        } else {
            Ok(())
        }
    }
}

impl ScoreStore for MemoryScoreStore {
    fn persist_final_scores(
        &self,
        scores: FinalScoresEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            store
                .inner
                .final_scores
                .insert((scores.account_id, scores.subject_id), scores);
            Ok(())
        })
    }

    fn find_final_scores(
        &self,
        account_id: Uuid,
        subject_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<FinalScoresEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            Ok(store
                .inner
                .final_scores
                .get(&(account_id, subject_id))
                .map(|entry| entry.value().clone()))
        })
    }

    fn find_subject(
        &self,
        account_id: Uuid,
        subject_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SubjectEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            Ok(store
                .inner
                .subjects
                .get(&(account_id, subject_id))
                .map(|entry| entry.value().clone()))
        })
    }

    fn find_account(
        &self,
        account_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AccountEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            Ok(store
                .inner
                .accounts
                .get(&account_id)
                .map(|entry| entry.value().clone()))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_online() })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_online() })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::state::sport::SportKind;

    fn scores(account_id: Uuid, subject_id: Uuid, version: u64) -> FinalScoresEntity {
        FinalScoresEntity {
            session_id: Uuid::new_v4(),
            account_id,
            subject_id,
            sport: SportKind::Baseball,
            final_position: 9,
            entries: serde_json::json!([]),
            aggregates: serde_json::json!({ "home_total": 0 }),
            version,
            finalized_by: "alice".into(),
            finalized_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn final_scores_are_keyed_by_subject() {
        let store = MemoryScoreStore::new();
        let account = Uuid::new_v4();
        let subject = Uuid::new_v4();

        store.persist_final_scores(scores(account, subject, 3)).await.unwrap();
        store.persist_final_scores(scores(account, subject, 5)).await.unwrap();
        assert_eq!(store.final_scores_count(), 1);

        let found = store.find_final_scores(account, subject).await.unwrap().unwrap();
        assert_eq!(found.version, 5);
        assert!(
            store
                .find_final_scores(Uuid::new_v4(), subject)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = MemoryScoreStore::new();
        store.set_offline(true);
        let err = store.health_check().await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.find_account(Uuid::new_v4()).await.is_err());

        store.set_offline(false);
        assert!(store.try_reconnect().await.is_ok());
    }
}
