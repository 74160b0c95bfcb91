//! Background tasks for the Skipper server.
//!
//! Includes:
//! - Clearing the duplicate-message guard.
//! - Sweeping turn tasks that no poll will ever drain (caller hung up
//!   mid-generation).

use crate::AppState;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Starts the duplicate-message guard reset task.
///
/// Runs indefinitely, forgetting every remembered message id once per
/// window.
pub async fn start_dedup_reset_task(state: Arc<AppState>, window_seconds: u64) {
    if window_seconds == 0 {
        tracing::warn!("dedup reset task disabled (window=0)");
        return;
    }

    let interval = Duration::from_secs(window_seconds);
    tracing::info!(window_seconds, "starting dedup reset task");

    loop {
        sleep(interval).await;
        let cleared = state.dedup.clear();
        if cleared > 0 {
            tracing::debug!(count = cleared, "cleared remembered message ids");
        }
    }
}

/// Starts the turn task expiry sweep.
///
/// Every `interval_seconds`, removes turn tasks older than `ttl_seconds`.
pub async fn start_turn_sweep_task(state: Arc<AppState>, interval_seconds: u64, ttl_seconds: u64) {
    if interval_seconds == 0 || ttl_seconds == 0 {
        tracing::warn!("turn sweep task disabled (interval or ttl is 0)");
        return;
    }

    let interval = Duration::from_secs(interval_seconds);
    let ttl = Duration::from_secs(ttl_seconds);
    tracing::info!(interval_seconds, ttl_seconds, "starting turn sweep task");

    loop {
        sleep(interval).await;
        let removed = state.turns.sweep_expired(ttl);
        if removed > 0 {
            tracing::info!(count = removed, "removed orphaned turn tasks");
        }
    }
}
