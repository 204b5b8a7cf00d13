//! Background sweeper for idle sessions and stale typing indicators.
//!
//! One low-frequency task drives both sweeps: the idle/abandoned session
//! close (which fans out `session_ended`) and the synthetic
//! `typing: false` for signals past the staleness ceiling. Cadence comes
//! from `sweep_interval_secs` in the chat config.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::state::AppState;

/// Spawn the sweeper task. Cancelling the token stops it at the next tick.
pub fn spawn_sweeper(state: AppState, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.sweep_interval());
        // The first tick fires immediately; skip it so startup is quiet.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match state.lifecycle.sweep_idle().await {
                        Ok(0) => {}
                        Ok(closed) => debug!(closed, "idle sweep closed sessions"),
                        Err(err) => error!("idle sweep failed: {err}"),
                    }
                    state.router.sweep_typing().await;
                }
                _ = shutdown.cancelled() => {
                    debug!("sweeper shutting down");
                    break;
                }
            }
        }
    })
}
