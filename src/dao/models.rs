use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{dto::session::SessionSnapshot, state::sport::SportKind};

/// Tenant owning subjects and live sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountEntity {
    /// Stable identifier for the account.
    pub id: Uuid,
    /// Display name of the league or club.
    pub name: String,
    /// Whether anyone may watch live scores without a membership.
    #[serde(default)]
    pub public_live_scores: bool,
    /// Users with a role in this account.
    #[serde(default)]
    pub members: Vec<MemberEntity>,
}

impl AccountEntity {
    /// Role of `user_id` in this account, if any.
    pub fn role_of(&self, user_id: &str) -> Option<MemberRole> {
        self.members
            .iter()
            .find(|member| member.user_id == user_id)
            .map(|member| member.role)
    }
}

/// Membership of a user in an account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberEntity {
    pub user_id: String,
    pub role: MemberRole,
}

/// Role granted by a membership.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    /// Manages the account; may score.
    Admin,
    /// May score matches and games.
    Scorer,
    /// Read access.
    Member,
}

/// Match or game that can be scored live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectEntity {
    pub id: Uuid,
    pub account_id: Uuid,
    pub sport: SportKind,
    pub name: String,
}

/// Durable record of a finalized session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalScoresEntity {
    pub session_id: Uuid,
    pub account_id: Uuid,
    pub subject_id: Uuid,
    pub sport: SportKind,
    /// Inning or hole the session ended at.
    pub final_position: u32,
    /// Score entries, as sent on the wire.
    pub entries: Value,
    /// Final totals, as sent on the wire.
    pub aggregates: Value,
    pub version: u64,
    pub finalized_by: String,
    pub finalized_at: SystemTime,
}

impl FinalScoresEntity {
    /// Build the record persisted when `snapshot` is finalized.
    pub fn from_snapshot<P, A>(
        snapshot: &SessionSnapshot<P, A>,
        finalized_by: &str,
    ) -> serde_json::Result<Self>
    where
        P: Serialize,
        A: Serialize,
    {
        Ok(Self {
            session_id: snapshot.session_id,
            account_id: snapshot.account_id,
            subject_id: snapshot.subject_id,
            sport: snapshot.sport,
            final_position: snapshot.current_position,
            entries: serde_json::to_value(&snapshot.entries)?,
            aggregates: serde_json::to_value(&snapshot.aggregates)?,
            version: snapshot.version,
            finalized_by: finalized_by.to_string(),
            finalized_at: SystemTime::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_lookup_matches_user() {
        let account = AccountEntity {
            id: Uuid::new_v4(),
            name: "Sunday League".into(),
            public_live_scores: false,
            members: vec![
                MemberEntity {
                    user_id: "alice".into(),
                    role: MemberRole::Scorer,
                },
                MemberEntity {
                    user_id: "bob".into(),
                    role: MemberRole::Member,
                },
            ],
        };
        assert_eq!(account.role_of("alice"), Some(MemberRole::Scorer));
        assert_eq!(account.role_of("bob"), Some(MemberRole::Member));
        assert_eq!(account.role_of("carol"), None);
    }

    #[test]
    fn account_flags_default_when_missing() {
        let id = Uuid::new_v4();
        let account: AccountEntity =
            serde_json::from_value(serde_json::json!({ "id": id, "name": "Club" })).unwrap();
        assert!(!account.public_live_scores);
        assert!(account.members.is_empty());
    }
}
