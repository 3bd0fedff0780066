// [apps/coordinator/src/services/reaper.rs]
//! Background hygiene daemon: requeues chunks whose reconnect grace period
//! expired, and demotes agents that stopped heartbeating outright (as
//! distinct from the per-chunk reconnect grace the websocket handler
//! already grants on a clean disconnect).

use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{info, warn};

use crate::state::AppState;

const REAPER_TICK_SECS: u64 = 30;

pub fn spawn_reaper(state: AppState) {
    tokio::spawn(async move {
        info!("reaper daemon starting");
        let mut ticker = interval(Duration::from_secs(REAPER_TICK_SECS));
        loop {
            ticker.tick().await;
            if state.is_operational().is_err() {
                continue;
            }
            reap_expired_reconnects(&state).await;
            reap_stale_running_chunks(&state).await;
            reap_stale_agents(&state).await;
        }
    });
}

/// A chunk's `updated_at` is the staleness clock: if an assigned agent
/// stops reporting progress for `task_heartbeat_timeout_secs` while its
/// channel is still open (a wedged cracker subprocess, a hung task),
/// requeue the chunk independently of the agent-level heartbeat check.
async fn reap_stale_running_chunks(state: &AppState) {
    let settings = state.current_settings();
    let stale = match state.chunk_repository.list_stale_running(settings.task_heartbeat_timeout_secs as i64).await {
        Ok(chunks) => chunks,
        Err(e) => {
            warn!(error = %e, "failed to list stale-running chunks");
            return;
        }
    };

    for chunk in stale {
        warn!(chunk_id = %chunk.id, "chunk progress went stale past task_heartbeat_timeout, requeuing");
        if let Some(agent_id) = chunk.assigned_agent_id {
            state.agent_repository.release_task(agent_id).await.ok();
        }
        if let Err(e) = state.chunk_repository.retry_or_fail(chunk.id, settings.max_chunk_retry_attempts).await {
            warn!(chunk_id = %chunk.id, error = %e, "failed to requeue a stale-running chunk");
        }
    }
}

async fn reap_expired_reconnects(state: &AppState) {
    match state.chunk_repository.requeue_expired_reconnects(Utc::now()).await {
        Ok(expired) if !expired.is_empty() => {
            info!(count = expired.len(), "reconnect grace period expired, chunks requeued to pending");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to sweep expired reconnect deadlines"),
    }
}

/// Agents whose heartbeat is older than `agent_heartbeat_timeout_secs` are
/// demoted to inactive and their in-flight chunk is released immediately,
/// rather than waiting on a websocket close event that, for a genuinely
/// wedged agent, may never arrive.
async fn reap_stale_agents(state: &AppState) {
    let timeout_secs = state.current_settings().agent_heartbeat_timeout_secs as i64;
    let stale = match state.agent_repository.list_stale(timeout_secs).await {
        Ok(agents) => agents,
        Err(e) => {
            warn!(error = %e, "failed to list stale agents");
            return;
        }
    };

    for agent in stale {
        warn!(agent_id = agent.id, "agent heartbeat timed out, demoting to inactive");
        state.agent_registry.unregister(agent.id);

        match state.chunk_repository.list_in_flight_for_agent(agent.id).await {
            Ok(chunks) => {
                for chunk in chunks {
                    state.chunk_repository.retry_or_fail(chunk.id, state.current_settings().max_chunk_retry_attempts).await.ok();
                }
            }
            Err(e) => warn!(agent_id = agent.id, error = %e, "failed to list in-flight chunks for a stale agent"),
        }

        state.agent_repository.release_task(agent.id).await.ok();
        state.agent_repository.mark_inactive(agent.id).await.ok();
    }
}
