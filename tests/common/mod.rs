#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use live_scoring_back::{
    config::{AppConfig, LiveConfig},
    dao::{
        models::{AccountEntity, MemberEntity, MemberRole, SubjectEntity},
        score_store::memory::MemoryScoreStore,
    },
    state::{AppState, SharedState, session::SubjectKey, sport::SportKind},
};
use uuid::Uuid;

pub const SCORER_A: &str = "alice";
pub const SCORER_B: &str = "bob";
pub const FAN: &str = "fan";

/// Backend with an in-memory store, one account, one game and one match.
pub struct Harness {
    pub state: SharedState,
    pub store: MemoryScoreStore,
    pub game: SubjectKey,
    pub golf_match: SubjectKey,
}

pub async fn harness() -> Harness {
    let state = AppState::new(AppConfig {
        live: LiveConfig {
            keep_alive: Duration::from_secs(1),
            persist_timeout: Duration::from_millis(500),
            ..LiveConfig::default()
        },
    });
    let store = MemoryScoreStore::new();
    let account_id = Uuid::new_v4();
    store.insert_account(AccountEntity {
        id: account_id,
        name: "Riverside League".into(),
        public_live_scores: false,
        members: vec![
            member(SCORER_A, MemberRole::Scorer),
            member(SCORER_B, MemberRole::Admin),
            member(FAN, MemberRole::Member),
        ],
    });

    let game = subject(&store, account_id, SportKind::Baseball, "Opening day");
    let golf_match = subject(&store, account_id, SportKind::Golf, "Club championship");
    state.set_score_store(Arc::new(store.clone())).await;

    Harness {
        state,
        store,
        game,
        golf_match,
    }
}

fn member(user_id: &str, role: MemberRole) -> MemberEntity {
    MemberEntity {
        user_id: user_id.into(),
        role,
    }
}

fn subject(store: &MemoryScoreStore, account_id: Uuid, sport: SportKind, name: &str) -> SubjectKey {
    let key = SubjectKey {
        account_id,
        subject_id: Uuid::new_v4(),
    };
    store.insert_subject(SubjectEntity {
        id: key.subject_id,
        account_id,
        sport,
        name: name.into(),
    });
    key
}

/// Poll `condition` until it holds, failing the test after a few seconds.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
