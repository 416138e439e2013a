use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::state::SharedState;

/// Periodically drop expired tickets and the tombstones of long-ended sessions.
pub async fn run(state: SharedState) {
    let mut timer = interval(state.config().live.sweep_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;
        sweep(&state);
    }
}

/// One sweep pass; returns the number of removed tickets and tombstones.
pub fn sweep(state: &SharedState) -> (usize, usize) {
    let retention = state.config().live.tombstone_retention;
    let tickets = state.tickets().prune_expired();
    let tombstones = state.baseball_sessions().prune_ended(retention)
        + state.golf_sessions().prune_ended(retention);

    if tickets > 0 || tombstones > 0 {
        debug!(tickets, tombstones, "swept expired live records");
    }
    (tickets, tombstones)
}
