// [apps/coordinator/src/services/dispatcher.rs]
//! Matches pending chunks to idle agents on a fixed tick. Claiming is an
//! atomic `UPDATE ... WHERE status = 'pending'`, so two ticks (or a tick
//! racing a reconnect) can never double-assign; a lost race is just
//! skipped for this tick and retried next time.

use std::time::Duration;

use chrono::Utc;
use prospector_domain_models::agent::Agent;
use prospector_domain_models::chunk::Chunk;
use prospector_domain_models::job::{Job, JobStatus};
use prospector_domain_models::message::{MessageEnvelope, MessageKind, TaskAssignmentPayload};
use tokio::time::interval;
use tracing::{debug, info, instrument, warn};

use crate::state::AppState;

pub fn spawn_dispatcher(state: AppState) {
    tokio::spawn(async move {
        info!("dispatcher tick loop starting");
        let mut ticker = interval(Duration::from_secs(state.current_settings().scheduler_check_interval_secs as u64));
        loop {
            ticker.tick().await;
            if let Err(reason) = state.is_operational() {
                debug!(reason, "dispatcher skipping tick: coordinator is in maintenance mode");
                continue;
            }
            if let Err(e) = run_dispatch_tick(&state).await {
                warn!(error = %e, "dispatch tick failed");
            }
        }
    });
}

/// Runs one dispatch pass. Exposed (not just called from the tick loop)
/// so integration tests can drive a single deterministic round instead of
/// waiting on `scheduler_check_interval_secs`.
#[instrument(skip(state))]
pub async fn run_dispatch_tick(state: &AppState) -> anyhow::Result<()> {
    let settings = state.current_settings();
    let now = Utc::now();

    let jobs = state.job_repository.list_dispatchable(100).await?;
    if settings.job_interruption_enabled {
        apply_preemption_policy(state, &settings, &jobs, now).await;
    }

    let mut available_agents = state.agent_repository.list_eligible_for_dispatch().await?;
    available_agents.retain(Agent::is_eligible_for_dispatch);
    if settings.agent_scheduling_enabled {
        available_agents.retain(|agent| agent.within_schedule(now));
    }
    available_agents.retain(|agent| state.agent_registry.is_connected(agent.id));
    if available_agents.is_empty() {
        return Ok(());
    }

    for job in jobs {
        if available_agents.is_empty() {
            break;
        }
        dispatch_job(state, &job, &mut available_agents).await?;
    }
    Ok(())
}

/// Optional, off-by-default priority preemption: a pending job whose
/// priority clears a running job's by `job_interruption_priority_threshold`
/// gets the running job's in-flight chunks signaled for cancellation once
/// `job_interruption_grace_period_secs` has elapsed since the condition was
/// first observed. Preempted chunks restart from scratch (no partial-
/// progress snapshot) rather than resuming their window.
async fn apply_preemption_policy(state: &AppState, settings: &prospector_domain_models::SchedulerSettings, jobs: &[Job], now: chrono::DateTime<Utc>) {
    let Some(highest_pending_priority) = jobs.iter().filter(|j| j.status == JobStatus::Pending).map(|j| j.priority).max() else {
        return;
    };

    let outranked_running: Vec<&Job> = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Running)
        .filter(|j| highest_pending_priority - j.priority >= settings.job_interruption_priority_threshold)
        .collect();

    let mut deadlines = match state.preemption_deadlines.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    deadlines.retain(|job_id, _| outranked_running.iter().any(|j| &j.id == job_id));

    for job in &outranked_running {
        let deadline = *deadlines.entry(job.id).or_insert_with(|| now + chrono::Duration::seconds(settings.job_interruption_grace_period_secs as i64));
        if now < deadline {
            continue;
        }
        deadlines.remove(&job.id);
        drop(deadlines);
        preempt_job_chunks(state, job.id).await;
        deadlines = match state.preemption_deadlines.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
    }
}

async fn preempt_job_chunks(state: &AppState, job_id: uuid::Uuid) {
    let chunks = match state.chunk_repository.list_by_job(job_id).await {
        Ok(chunks) => chunks,
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "failed to list chunks for preemption");
            return;
        }
    };

    for chunk in chunks.into_iter().filter(Chunk::is_in_flight) {
        if let Some(agent_id) = chunk.assigned_agent_id {
            let envelope = MessageEnvelope::new(MessageKind::TaskCancellation { task_id: chunk.id });
            state.agent_registry.send_to(agent_id, &envelope);
            state.agent_repository.release_task(agent_id).await.ok();
        }
        if let Err(e) = state.chunk_repository.preempt_running(chunk.id).await {
            warn!(chunk_id = %chunk.id, error = %e, "failed to preempt a running chunk");
        } else {
            info!(job_id = %job_id, chunk_id = %chunk.id, "chunk preempted by a higher-priority job");
        }
    }
}

async fn dispatch_job(state: &AppState, job: &Job, available_agents: &mut Vec<Agent>) -> anyhow::Result<()> {
    if let Some(cap) = job.max_agents {
        let currently_in_flight = state
            .chunk_repository
            .list_by_job(job.id)
            .await?
            .into_iter()
            .filter(Chunk::is_in_flight)
            .count();
        if currently_in_flight as u32 >= cap {
            return Ok(());
        }
    }

    let pending = state.chunk_repository.list_pending_for_job(job.id, 256).await?;
    for chunk in pending {
        if available_agents.is_empty() {
            break;
        }
        if let Some(cap) = job.max_agents {
            let currently_in_flight =
                state.chunk_repository.list_by_job(job.id).await?.into_iter().filter(Chunk::is_in_flight).count();
            if currently_in_flight as u32 >= cap {
                break;
            }
        }
        if chunk.is_rule_split_task && !rule_chunk_file_is_synced(state, &chunk) {
            debug!(chunk_id = %chunk.id, "rule-chunk file not yet synced, deferring dispatch");
            continue;
        }

        let agent = available_agents[0].clone();

        match state.chunk_repository.claim(chunk.id, agent.id).await {
            Ok(()) => {}
            Err(e) => {
                warn!(chunk_id = %chunk.id, error = %e, "lost the claim race, trying the next chunk");
                continue;
            }
        }
        if let Err(e) = state.agent_repository.assign_task(agent.id, chunk.id).await {
            warn!(agent_id = agent.id, chunk_id = %chunk.id, error = %e, "failed to mark agent busy after claiming a chunk");
            state.chunk_repository.retry_or_fail(chunk.id, u32::MAX).await.ok();
            continue;
        }

        available_agents.remove(0);

        let envelope = MessageEnvelope::new(MessageKind::TaskAssignment(build_assignment_payload(state, job, &chunk)));
        if !state.agent_registry.send_to(agent.id, &envelope) {
            warn!(agent_id = agent.id, chunk_id = %chunk.id, "assigned chunk to an agent with no live socket, it will recover via reconnect grace");
        }
        state.job_repository.increment_dispatched_keyspace(job.id, chunk.effective_window_size()).await.ok();
        info!(job_id = %job.id, chunk_id = %chunk.id, agent_id = agent.id, "chunk dispatched");
    }
    Ok(())
}

fn rule_chunk_file_is_synced(state: &AppState, chunk: &Chunk) -> bool {
    match &chunk.rule_chunk_path {
        Some(path) => state.files_root.join(path).is_file(),
        None => true,
    }
}

fn build_assignment_payload(state: &AppState, job: &Job, chunk: &Chunk) -> TaskAssignmentPayload {
    let settings = state.current_settings();
    let attack_mode = match serde_json::to_value(job.attack.mode) {
        Ok(serde_json::Value::String(s)) => s,
        _ => "dictionary".to_string(),
    };

    let wordlist_paths = job.attack.wordlist_refs.iter().map(|name| format!("wordlists/{name}")).collect();
    let rule_paths = if chunk.is_rule_split_task {
        chunk.rule_chunk_path.clone().into_iter().collect()
    } else {
        job.attack.rule_file_refs.iter().map(|name| format!("rules/{name}")).collect()
    };

    TaskAssignmentPayload {
        task_id: chunk.id,
        job_execution_id: job.id,
        hashlist_id: job.hashlist_id,
        hashlist_path: format!("hashlists/{}.txt", job.hashlist_id),
        attack_mode,
        hash_type: job.hash_algorithm_id,
        keyspace_start: chunk.keyspace_start,
        keyspace_end: chunk.keyspace_end,
        wordlist_paths,
        rule_paths,
        mask: job.attack.mask.clone(),
        binary_path: format!("binaries/{}", state.cracking_binary_name),
        chunk_duration: chunk.chunk_duration_seconds,
        report_interval: settings.progress_reporting_interval_secs,
        extra_parameters: Vec::new(),
        enabled_devices: Vec::new(),
        effective_keyspace_start: chunk.effective_keyspace_start,
        effective_keyspace_end: chunk.effective_keyspace_end,
    }
}
