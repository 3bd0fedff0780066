// [apps/coordinator/src/handlers/ws.rs]
//! The long-lived bidirectional channel an agent opens on startup and
//! holds for its whole lifetime. One socket per agent, split into three
//! tasks (send, receive, internal worker) so a slow database write never
//! stalls the keepalive ping, and the first task to end tears down the
//! other two.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use prospector_domain_models::message::{MessageEnvelope, MessageKind};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, instrument, warn};

use crate::services::{aggregator, crack_pipeline};
use crate::state::AppState;

const KEEPALIVE_INTERVAL_SECS: u64 = 25;
const OUTBOUND_BUFFER_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
pub struct AgentChannelQuery {
    token: String,
}

/// Negotiates the protocol upgrade. The bearer token travels as a query
/// parameter here rather than an `Authorization` header, since the
/// websocket handshake itself doesn't carry one through every proxy, so
/// this route sits outside `auth_guard` and checks the token itself.
#[instrument(skip(upgrade, state, query), fields(agent_id))]
pub async fn handle_upgrade(
    upgrade: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(agent_id): Path<i64>,
    Query(query): Query<AgentChannelQuery>,
) -> impl IntoResponse {
    if query.token != *state.agent_bearer_token {
        warn!(agent_id, "agent channel rejected: bad token");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    upgrade.on_upgrade(move |socket| handle_agent_channel(socket, state, agent_id))
}

async fn handle_agent_channel(socket: WebSocket, state: AppState, agent_id: i64) {
    if let Err(e) = state.agent_repository.record_heartbeat(agent_id).await {
        warn!(agent_id, error = %e, "agent channel opened for an unknown agent id, closing");
        return;
    }
    resume_reconnected_chunks(&state, agent_id).await;

    let (mut socket_sender, mut socket_receiver) = socket.split();
    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<Message>();
    state.agent_registry.register(agent_id, outbound_sender);
    info!(agent_id, "agent channel established");

    let mut sender_task = tokio::spawn(async move {
        let mut keepalive = interval(Duration::from_secs(KEEPALIVE_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = keepalive.tick() => {
                    if socket_sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                outgoing = outbound_receiver.recv() => {
                    match outgoing {
                        Some(message) => {
                            if socket_sender.send(message).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });

    let state_for_receiver = state.clone();
    let mut receiver_task = tokio::spawn(async move {
        while let Some(frame) = socket_receiver.next().await {
            match frame {
                Ok(Message::Text(raw)) => {
                    if let Err(e) = handle_inbound_text(&state_for_receiver, agent_id, &raw).await {
                        warn!(agent_id, error = %e, "failed to process inbound agent message");
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!(agent_id, "agent closed the channel");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(agent_id, error = %e, "agent channel read error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut sender_task => receiver_task.abort(),
        _ = &mut receiver_task => sender_task.abort(),
    }

    cleanup_disconnected_agent(&state, agent_id).await;
}

async fn handle_inbound_text(state: &AppState, agent_id: i64, raw: &str) -> anyhow::Result<()> {
    let envelope: MessageEnvelope = serde_json::from_str(raw)?;

    if !state.message_dedup.insert_if_absent(&envelope.id.to_string()) {
        debug!(agent_id, envelope_id = %envelope.id, "duplicate envelope, already processed");
        return Ok(());
    }

    match envelope.kind {
        MessageKind::Heartbeat => {
            state.agent_repository.record_heartbeat(agent_id).await?;
        }
        MessageKind::AgentStatus(payload) => {
            let sync_status = sync_status_from_wire(&payload.sync_status);
            state
                .agent_repository
                .update_sync_progress(agent_id, sync_status, payload.files_to_sync, payload.files_synced, None)
                .await?;
            if !payload.device_metrics.is_empty() {
                state.metrics_repository.record(agent_id, None, &payload.device_metrics).await?;
            }
        }
        MessageKind::TaskProgress(payload) => {
            aggregator::handle_task_progress(state, agent_id, &payload).await?;
        }
        MessageKind::CrackedBatch(payload) => {
            let chunk = state.chunk_repository.fetch(payload.task_id).await?;
            let job = state.job_repository.fetch(chunk.job_id).await?;
            crack_pipeline::record_cracks_and_maybe_complete_job(state, job.id, job.hashlist_id, chunk.id, &payload.cracks).await?;
        }
        MessageKind::BenchmarkResult(payload) => {
            info!(agent_id, hash_type = payload.hash_type, total_speed = payload.total_speed, "benchmark result received");
        }
        MessageKind::FileSyncRequest(_) => {
            debug!(agent_id, "file-sync requests are served over HTTP, ignoring one on the channel");
        }
        MessageKind::TaskAssignment(_) | MessageKind::BenchmarkRequest(_) | MessageKind::TaskCancellation { .. } => {
            warn!(agent_id, "received a coordinator-to-agent message kind from an agent, ignoring");
        }
    }
    Ok(())
}

fn sync_status_from_wire(raw: &str) -> prospector_domain_models::agent::SyncStatus {
    use prospector_domain_models::agent::SyncStatus;
    match raw {
        "in_progress" => SyncStatus::InProgress,
        "completed" => SyncStatus::Completed,
        "failed" => SyncStatus::Failed,
        _ => SyncStatus::Pending,
    }
}

/// If this agent reconnected within an in-flight chunk's grace period, pick
/// its running task back up rather than waiting for the reaper to requeue it.
async fn resume_reconnected_chunks(state: &AppState, agent_id: i64) {
    match state.chunk_repository.list_reconnect_pending_for_agent(agent_id).await {
        Ok(chunks) => {
            for chunk in chunks {
                if let Err(e) = state.chunk_repository.clear_reconnect_pending(chunk.id).await {
                    warn!(agent_id, chunk_id = %chunk.id, error = %e, "failed to resume reconnect-pending chunk");
                }
            }
        }
        Err(e) => warn!(agent_id, error = %e, "failed to list reconnect-pending chunks on reconnect"),
    }
}

async fn cleanup_disconnected_agent(state: &AppState, agent_id: i64) {
    state.agent_registry.unregister(agent_id);

    let grace_period = chrono::Duration::seconds(state.current_settings().reconnect_grace_period_secs as i64);
    match state.chunk_repository.list_in_flight_for_agent(agent_id).await {
        Ok(chunks) => {
            let deadline = chrono::Utc::now() + grace_period;
            for chunk in chunks {
                if let Err(e) = state.chunk_repository.mark_reconnect_pending(chunk.id, deadline).await {
                    warn!(agent_id, chunk_id = %chunk.id, error = %e, "failed to mark chunk reconnect-pending on disconnect");
                }
            }
        }
        Err(e) => warn!(agent_id, error = %e, "failed to list in-flight chunks on disconnect"),
    }

    state.agent_repository.release_task(agent_id).await.ok();
    state.agent_repository.mark_inactive(agent_id).await.ok();
    info!(agent_id, "agent channel closed");
}
