use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{AccountEntity, MemberRole},
        score_store::ScoreStore,
    },
    error::ServiceError,
    state::{AppState, channel::ConnectionRole, session::SubjectKey},
};

/// Capability check over the account records of the score store.
///
/// The last account record read from storage is kept so sessions that are already running
/// can still be scored and watched while the store is unreachable.
#[derive(Default)]
pub struct Authorizer {
    accounts: DashMap<Uuid, AccountEntity>,
}

impl Authorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `identity` may act as `role` on `subject_id` of `account_id`.
    pub async fn can_act(
        &self,
        store: Option<Arc<dyn ScoreStore>>,
        identity: &str,
        account_id: Uuid,
        subject_id: Uuid,
        role: ConnectionRole,
    ) -> Result<bool, ServiceError> {
        let account = match store {
            Some(store) => match store.find_account(account_id).await {
                Ok(Some(account)) => {
                    self.accounts.insert(account_id, account.clone());
                    Some(account)
                }
                Ok(None) => {
                    self.accounts.remove(&account_id);
                    None
                }
                Err(err) if err.is_transient() => {
                    warn!(%account_id, error = %err, "account lookup failed; using cached record");
                    Some(self.cached(account_id).ok_or(ServiceError::Unavailable(err))?)
                }
                Err(err) => return Err(err.into()),
            },
            None => Some(self.cached(account_id).ok_or(ServiceError::Degraded)?),
        };

        let allowed = account
            .as_ref()
            .is_some_and(|account| membership_allows(account, identity, role));
        debug!(
            %account_id,
            %subject_id,
            identity,
            role = ?role,
            allowed,
            "capability check"
        );
        Ok(allowed)
    }

    fn cached(&self, account_id: Uuid) -> Option<AccountEntity> {
        self.accounts
            .get(&account_id)
            .map(|entry| entry.value().clone())
    }
}

/// Scorers need an `admin` or `scorer` membership; watchers need any membership, or none on
/// an account with public live scores.
pub fn membership_allows(account: &AccountEntity, identity: &str, role: ConnectionRole) -> bool {
    let membership = account.role_of(identity);
    match role {
        ConnectionRole::Scorer => {
            matches!(membership, Some(MemberRole::Admin | MemberRole::Scorer))
        }
        ConnectionRole::Watcher => membership.is_some() || account.public_live_scores,
    }
}

/// Reject with [`ServiceError::Forbidden`] unless `identity` may act as `role` on `key`.
pub async fn require(
    state: &AppState,
    identity: &str,
    key: SubjectKey,
    role: ConnectionRole,
) -> Result<(), ServiceError> {
    let store = state.score_store().await;
    let allowed = state
        .authorizer()
        .can_act(store, identity, key.account_id, key.subject_id, role)
        .await?;

    if allowed {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "{identity} may not act as {role:?} on subject {}",
            key.subject_id
        )))
    }
}
