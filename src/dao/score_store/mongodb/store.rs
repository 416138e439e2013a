use std::sync::Arc;

use futures::{FutureExt, future::BoxFuture};
use mongodb::{Collection, Database, IndexModel, bson::doc, options::IndexOptions};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::{Connection, ping},
    error::{MongoDaoError, MongoResult},
    models::{
        ACCOUNTS_COLLECTION, FINAL_SCORES_COLLECTION, MongoAccountDocument,
        MongoFinalScoresDocument, MongoSubjectDocument, SUBJECTS_COLLECTION, doc_id,
        subject_doc_id,
    },
};
use crate::dao::{
    models::{AccountEntity, FinalScoresEntity, SubjectEntity},
    score_store::ScoreStore,
    storage::StorageResult,
};

/// Score store over three MongoDB collections: final scores, subjects and accounts.
#[derive(Clone)]
pub struct MongoScoreStore {
    inner: Arc<Inner>,
}

struct Inner {
    connection: RwLock<Connection>,
    config: MongoConfig,
}

impl MongoScoreStore {
    /// Connect, then make sure the lookup indexes exist.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let connection = Connection::open(&config).await?;
        let store = Self {
            inner: Arc::new(Inner {
                connection: RwLock::new(connection),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn database(&self) -> Database {
        self.inner.connection.read().await.database.clone()
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database().await.collection::<T>(name)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let indexes: [(&'static str, _, &str); 2] = [
            (
                FINAL_SCORES_COLLECTION,
                doc! { "account_id": 1 },
                "final_scores_account_idx",
            ),
            (
                SUBJECTS_COLLECTION,
                doc! { "account_id": 1, "sport": 1 },
                "subject_account_sport_idx",
            ),
        ];
        let database = self.database().await;
        for (collection, keys, name) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(Some(name.to_owned())).build())
                .build();
            database
                .collection::<mongodb::bson::Document>(collection)
                .create_index(model)
                .await
                .map_err(MongoDaoError::operation("index creation", collection))?;
        }
        Ok(())
    }

    /// Load one document by `_id` and convert it into its entity.
    async fn load<D, E>(&self, collection: &'static str, id: String) -> MongoResult<Option<E>>
    where
        D: DeserializeOwned + Serialize + Send + Sync,
        E: TryFrom<D, Error = MongoDaoError>,
    {
        self.collection::<D>(collection)
            .await
            .find_one(doc_id(id))
            .await
            .map_err(MongoDaoError::operation("lookup", collection))?
            .map(E::try_from)
            .transpose()
    }

    async fn save_final(&self, scores: FinalScoresEntity) -> MongoResult<()> {
        let id = subject_doc_id(scores.account_id, scores.subject_id);
        let document = MongoFinalScoresDocument::from(scores);
        self.collection::<MongoFinalScoresDocument>(FINAL_SCORES_COLLECTION)
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(MongoDaoError::operation("upsert", FINAL_SCORES_COLLECTION))?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let fresh = Connection::open(&self.inner.config).await?;
        *self.inner.connection.write().await = fresh;
        Ok(())
    }
}

impl ScoreStore for MongoScoreStore {
    fn persist_final_scores(
        &self,
        scores: FinalScoresEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        async move { Ok(store.save_final(scores).await?) }.boxed()
    }

    fn find_final_scores(
        &self,
        account_id: Uuid,
        subject_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<FinalScoresEntity>>> {
        let store = self.clone();
        async move {
            let id = subject_doc_id(account_id, subject_id);
            Ok(store
                .load::<MongoFinalScoresDocument, _>(FINAL_SCORES_COLLECTION, id)
                .await?)
        }
        .boxed()
    }

    fn find_subject(
        &self,
        account_id: Uuid,
        subject_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SubjectEntity>>> {
        let store = self.clone();
        async move {
            let id = subject_doc_id(account_id, subject_id);
            Ok(store
                .load::<MongoSubjectDocument, _>(SUBJECTS_COLLECTION, id)
                .await?)
        }
        .boxed()
    }

    fn find_account(
        &self,
        account_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AccountEntity>>> {
        let store = self.clone();
        async move {
            Ok(store
                .load::<MongoAccountDocument, _>(ACCOUNTS_COLLECTION, account_id.to_string())
                .await?)
        }
        .boxed()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        async move {
            let database = store.database().await;
            ping(&database).await.map_err(MongoDaoError::Ping)?;
            Ok(())
        }
        .boxed()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        async move { Ok(store.reconnect().await?) }.boxed()
    }
}
