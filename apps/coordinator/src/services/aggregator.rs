// [apps/coordinator/src/services/aggregator.rs]
//! Folds an agent's `task_progress` report into the chunk and job tables:
//! monotonic progress, the continuous keyspace self-correction, the
//! job-level percentage rollup, and the terminal-status transition
//! (complete, retry, or permanently fail).

use prospector_core_keyspace::recompute_pending_tail;
use prospector_domain_models::job::{Job, JobStatus, KeyspaceAccounting};
use prospector_domain_models::message::{AgentReportedStatus, TaskProgressPayload};
use tracing::{info, warn};

use crate::services::crack_pipeline;
use crate::state::AppState;

pub async fn handle_task_progress(state: &AppState, agent_id: i64, payload: &TaskProgressPayload) -> anyhow::Result<()> {
    let chunk = state.chunk_repository.fetch(payload.task_id).await?;
    let mut job = state.job_repository.fetch(chunk.job_id).await?;

    if let Some(actual) = payload.total_effective_keyspace {
        if chunk.chunk_actual_keyspace.is_none() {
            job.keyspace = apply_keyspace_correction(state, &chunk, &job, actual).await?;
        }
    }

    state
        .chunk_repository
        .record_progress(
            chunk.id,
            payload.effective_progress,
            payload.progress_percent,
            payload.total_effective_keyspace,
            payload.cracked_count,
            Some(payload.hash_rate as f64),
        )
        .await?;

    if !payload.device_metrics.is_empty() {
        state.metrics_repository.record(agent_id, Some(chunk.id), &payload.device_metrics).await?;
    }

    let mut job_completed = false;
    if !payload.cracked_hashes.is_empty() {
        job_completed =
            crack_pipeline::record_cracks_and_maybe_complete_job(state, job.id, job.hashlist_id, chunk.id, &payload.cracked_hashes).await?;
    }

    if payload.status.is_terminal() {
        finish_chunk(state, &payload.status, chunk.id, payload.cracked_count, job.id).await?;
    }

    if payload.all_hashes_cracked && !job_completed {
        state.chunk_repository.cancel_remaining_for_job(job.id).await.ok();
        state.job_repository.transition_status(job.id, JobStatus::Completed).await.ok();
    }

    update_job_progress_percent(state, &job).await;

    Ok(())
}

/// Rolls every chunk's processed effective keyspace up into the job-level
/// percentage. Best-effort: a failure here never aborts the progress report
/// that drove it, since the chunk-level watermark has already landed.
async fn update_job_progress_percent(state: &AppState, job: &Job) {
    let total_processed = match state.chunk_repository.sum_effective_processed_for_job(job.id).await {
        Ok(total) => total,
        Err(e) => {
            warn!(job_id = %job.id, error = %e, "failed to sum chunk progress for the job-level percentage");
            return;
        }
    };
    let percent = job.raw_percent_complete(total_processed);
    if let Err(e) = state.job_repository.record_progress_percent(job.id, percent).await {
        warn!(job_id = %job.id, error = %e, "failed to persist the job-level progress percentage");
    }
}

async fn finish_chunk(
    state: &AppState,
    status: &AgentReportedStatus,
    chunk_id: uuid::Uuid,
    crack_count: u64,
    job_id: uuid::Uuid,
) -> anyhow::Result<()> {
    match status {
        AgentReportedStatus::Completed | AgentReportedStatus::ExhaustedNoCracks => {
            state.chunk_repository.complete(chunk_id, crack_pipeline::detailed_status_for(crack_count)).await?;
            state.job_repository.reset_consecutive_failures(job_id).await.ok();
        }
        AgentReportedStatus::Aborted
        | AgentReportedStatus::GpuWatchdogAlarm
        | AgentReportedStatus::AlreadyRunningRetryable
        | AgentReportedStatus::Failed => {
            let settings = state.current_settings();
            let resulting = state.chunk_repository.retry_or_fail(chunk_id, settings.max_chunk_retry_attempts).await?;
            let job_failures = state.job_repository.record_chunk_failure(job_id).await?;
            if resulting == prospector_domain_models::chunk::ChunkStatus::Failed && job_failures >= settings.job_max_consecutive_failures {
                warn!(job_id = %job_id, "job exceeded its consecutive-failure budget, marking failed");
                state.job_repository.transition_status(job_id, JobStatus::Failed).await.ok();
            }
        }
        AgentReportedStatus::Running => unreachable!("finish_chunk is only called for terminal statuses"),
    }
    Ok(())
}

/// Folds this chunk's actual vs. planned effective keyspace into the job's
/// running weighted-average correction, then rewindows every still-pending
/// chunk — both its word-position `--skip`/`--limit` window and its
/// candidate-position window — in one atomic batch so the remainder of the
/// job reflects the corrected rate.
async fn apply_keyspace_correction(
    state: &AppState,
    chunk: &prospector_domain_models::chunk::Chunk,
    job: &Job,
    actual_effective_keyspace: u64,
) -> anyhow::Result<KeyspaceAccounting> {
    let accounting = state
        .job_repository
        .apply_keyspace_observation(job.id, chunk.word_window_size(), actual_effective_keyspace)
        .await?;
    info!(
        job_id = %job.id,
        avg_rule_multiplier = accounting.avg_rule_multiplier,
        effective_keyspace = accounting.effective_keyspace,
        "keyspace observation folded into the running weighted average"
    );

    let pending = state.chunk_repository.list_pending_for_job(job.id, 100_000).await?;
    if pending.is_empty() {
        return Ok(accounting);
    }
    let already_covered = pending[0].effective_keyspace_start;
    let reference_rate = (chunk.effective_window_size().max(1) as f64 / chunk.chunk_duration_seconds.max(1) as f64).max(1.0) as u64;
    let settings = state.current_settings();

    let windows = recompute_pending_tail(
        accounting.effective_keyspace,
        already_covered,
        reference_rate,
        settings.default_chunk_duration_secs as u64,
        settings.chunk_fluctuation_percentage,
    )?;

    if windows.len() != pending.len() {
        warn!(
            job_id = %job.id,
            old_pending = pending.len(),
            new_windows = windows.len(),
            "keyspace correction changed the pending chunk count; rewindowing only the overlap"
        );
    }

    // effective_pos = word_pos * avg_rule_multiplier, so the word-position
    // window the engine actually runs against is the effective window
    // divided back down by the same corrected multiplier.
    let multiplier = accounting.avg_rule_multiplier.max(f64::MIN_POSITIVE);
    let rewindows: Vec<(uuid::Uuid, u64, u64, u64, u64)> = pending
        .iter()
        .zip(windows.iter())
        .map(|(existing, window)| {
            let word_start = (window.skip as f64 / multiplier).round() as u64;
            let word_end = (window.end() as f64 / multiplier).round() as u64;
            (existing.id, word_start, word_end, window.skip, window.end())
        })
        .collect();

    state.chunk_repository.rewindow_pending_batch(&rewindows).await?;
    Ok(accounting)
}
