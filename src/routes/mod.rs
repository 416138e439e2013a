use axum::Router;

use crate::state::{
    SharedState,
    sport::{Baseball, Golf},
};

pub mod accounts;
pub mod docs;
pub mod health;
pub mod identity;
pub mod live;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(accounts::router())
        .merge(live::router::<Baseball>())
        .merge(live::router::<Golf>())
        .merge(docs::router())
        .with_state(state)
}
