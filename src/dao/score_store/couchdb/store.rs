use std::sync::Arc;

use futures::{FutureExt, future::BoxFuture};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info};
use uuid::Uuid;

use crate::dao::{
    models::{AccountEntity, FinalScoresEntity, SubjectEntity},
    score_store::ScoreStore,
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{CouchDocument, account_doc_id, final_doc_id, subject_doc_id},
};

/// Score store backed by a single CouchDB database.
#[derive(Clone)]
pub struct CouchScoreStore {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    config: CouchConfig,
}

impl CouchScoreStore {
    /// Build the HTTP client and create the database when it is missing.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(CouchDaoError::Client)?;
        let store = Self {
            inner: Arc::new(Inner { client, config }),
        };
        store.ensure_database().await?;
        info!(database = %store.inner.config.database, "connected to CouchDB");
        Ok(store)
    }

    /// `path` is relative to the database; an empty path targets the database itself.
    fn build(&self, method: Method, path: &str) -> RequestBuilder {
        let config = &self.inner.config;
        let url = if path.is_empty() {
            format!("{}/{}", config.base_url, config.database)
        } else {
            format!("{}/{}/{}", config.base_url, config.database, path)
        };
        let builder = self.inner.client.request(method, url);
        match &config.credentials {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        builder: RequestBuilder,
    ) -> CouchResult<Response> {
        builder
            .send()
            .await
            .map_err(|source| CouchDaoError::Unreachable {
                method,
                path: path.to_owned(),
                source,
            })
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let response = self.send(Method::GET, "", self.build(Method::GET, "")).await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                let created = self.send(Method::PUT, "", self.build(Method::PUT, "")).await?;
                // 412 means a concurrent creator won the race.
                match created.status() {
                    status if status.is_success() || status == StatusCode::PRECONDITION_FAILED => {
                        Ok(())
                    }
                    status => Err(unexpected(Method::PUT, "", status)),
                }
            }
            status => Err(unexpected(Method::GET, "", status)),
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        doc_id: &str,
    ) -> CouchResult<Option<CouchDocument<T>>> {
        let response = self
            .send(Method::GET, doc_id, self.build(Method::GET, doc_id))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|source| CouchDaoError::Unreachable {
                        method: Method::GET,
                        path: doc_id.to_owned(),
                        source,
                    })?;
                serde_json::from_slice(&bytes)
                    .map(Some)
                    .map_err(|source| CouchDaoError::Decode {
                        doc_id: doc_id.to_owned(),
                        source,
                    })
            }
            status => Err(unexpected(Method::GET, doc_id, status)),
        }
    }

    async fn put<T: Serialize>(&self, document: &CouchDocument<T>) -> CouchResult<()> {
        let doc_id = document.id.as_str();
        let response = self
            .send(
                Method::PUT,
                doc_id,
                self.build(Method::PUT, doc_id).json(document),
            )
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::RevisionConflict(doc_id.to_owned())),
            status => Err(unexpected(Method::PUT, doc_id, status)),
        }
    }

    /// Write the final scores, overwriting a previous record of the same subject.
    ///
    /// A revision conflict is retried once with the fresh revision.
    async fn upsert_final(&self, scores: FinalScoresEntity) -> CouchResult<()> {
        let doc_id = final_doc_id(scores.account_id, scores.subject_id);
        let mut document = CouchDocument::new(doc_id, scores);
        for attempt in 0..2 {
            document.rev = self
                .fetch::<serde_json::Value>(&document.id)
                .await?
                .and_then(|existing| existing.rev);
            match self.put(&document).await {
                Err(CouchDaoError::RevisionConflict(_)) if attempt == 0 => {
                    debug!(doc_id = %document.id, "final scores revision moved; retrying");
                }
                result => return result,
            }
        }
        Err(CouchDaoError::RevisionConflict(document.id))
    }
}

fn unexpected(method: Method, path: &str, status: StatusCode) -> CouchDaoError {
    CouchDaoError::Status {
        method,
        path: path.to_owned(),
        status,
    }
}

impl ScoreStore for CouchScoreStore {
    fn persist_final_scores(
        &self,
        scores: FinalScoresEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        async move { Ok(store.upsert_final(scores).await?) }.boxed()
    }

    fn find_final_scores(
        &self,
        account_id: Uuid,
        subject_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<FinalScoresEntity>>> {
        let store = self.clone();
        async move {
            let doc_id = final_doc_id(account_id, subject_id);
            let document = store.fetch::<FinalScoresEntity>(&doc_id).await?;
            Ok(document.map(|doc| doc.body))
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
            let doc_id = subject_doc_id(account_id, subject_id);
            let Some(document) = store.fetch::<SubjectEntity>(&doc_id).await? else {
                return Ok(None);
            };
            let subject = document.body;
            if subject.account_id != account_id || subject.id != subject_id {
                return Err(CouchDaoError::Inconsistent {
                    doc_id,
                    reason: "subject body does not match its identifier".into(),
                }
                .into());
            }
            Ok(Some(subject))
        }
        .boxed()
    }

    fn find_account(
        &self,
        account_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AccountEntity>>> {
        let store = self.clone();
        async move {
            let document = store
                .fetch::<AccountEntity>(&account_doc_id(account_id))
                .await?;
            Ok(document.map(|doc| doc.body))
        }
        .boxed()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        async move {
            let response = store
                .send(Method::HEAD, "", store.build(Method::HEAD, ""))
                .await?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(unexpected(Method::HEAD, "", response.status()).into())
            }
        }
        .boxed()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        async move { Ok(store.ensure_database().await?) }.boxed()
    }
}
