// [libs/infra/db/src/repositories/chunk_repository.rs]
/*!
 * Persistence for chunks (the unit of dispatch). Claiming, progress
 * recording and reconnect handling are all atomic `UPDATE ... WHERE`
 * statements so two concurrent dispatcher ticks can never double-assign
 * the same chunk, and a stale progress report can never move a chunk
 * backwards.
 */

use crate::errors::DbError;
use crate::sql_enum::{from_sql_string, to_sql_string};
use crate::DbClient;
use chrono::{DateTime, Duration, Utc};
use libsql::{params, Row};
use prospector_domain_models::chunk::{Chunk, ChunkStatus, DetailedStatus};
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub struct ChunkRepository {
    client: DbClient,
}

impl ChunkRepository {
    pub fn new(client: DbClient) -> Self {
        Self { client }
    }

    #[instrument(skip(self, chunk))]
    pub async fn create(&self, chunk: &Chunk) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        connection
            .execute(
                "INSERT INTO chunks (
                    id, job_id, chunk_number, assigned_agent_id,
                    keyspace_start, keyspace_end,
                    effective_keyspace_start, effective_keyspace_end, effective_keyspace_processed,
                    rule_start_index, rule_end_index, rule_chunk_path, is_rule_split_task,
                    chunk_actual_keyspace, status, detailed_status, retry_count, consecutive_failures,
                    benchmark_speed, chunk_duration_seconds, progress_percent, crack_count, average_speed
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
                params![
                    chunk.id.to_string(),
                    chunk.job_id.to_string(),
                    chunk.chunk_number as i64,
                    chunk.assigned_agent_id,
                    chunk.keyspace_start as i64,
                    chunk.keyspace_end as i64,
                    chunk.effective_keyspace_start as i64,
                    chunk.effective_keyspace_end as i64,
                    chunk.effective_keyspace_processed as i64,
                    chunk.rule_start_index.map(|v| v as i64),
                    chunk.rule_end_index.map(|v| v as i64),
                    chunk.rule_chunk_path.clone(),
                    if chunk.is_rule_split_task { 1 } else { 0 },
                    chunk.chunk_actual_keyspace.map(|v| v as i64),
                    to_sql_string(&chunk.status),
                    to_sql_string(&chunk.detailed_status),
                    chunk.retry_count as i64,
                    chunk.consecutive_failures as i64,
                    chunk.benchmark_speed.map(|v| v as i64),
                    chunk.chunk_duration_seconds as i64,
                    chunk.progress_percent,
                    chunk.crack_count as i64,
                    chunk.average_speed,
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn fetch(&self, id: Uuid) -> Result<Chunk, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection.query("SELECT * FROM chunks WHERE id = ?1", params![id.to_string()]).await?;
        match rows.next().await? {
            Some(row) => map_row_to_chunk(&row),
            None => Err(DbError::ChunkNotFound(id)),
        }
    }

    /// Atomically assigns a pending chunk to an agent. Loses the race if
    /// another dispatcher tick (or another process) already claimed it.
    #[instrument(skip(self))]
    pub async fn claim(&self, chunk_id: Uuid, agent_id: i64) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE chunks SET status = 'assigned', assigned_agent_id = ?2, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1 AND status = 'pending'",
                params![chunk_id.to_string(), agent_id],
            )
            .await?;
        if affected == 0 {
            warn!(chunk_id = %chunk_id, "claim lost: chunk was no longer pending");
            return Err(DbError::ClaimConflict(chunk_id));
        }
        info!(chunk_id = %chunk_id, agent_id, "chunk claimed");
        Ok(())
    }

    pub async fn mark_running(&self, chunk_id: Uuid) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE chunks SET status = 'running', updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1 AND status = 'assigned'",
                params![chunk_id.to_string()],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::InvalidState);
        }
        Ok(())
    }

    /// Records a progress update. `effective_keyspace_processed` is clamped
    /// to never regress: a stale, out-of-order report can only raise the
    /// stored watermark, never lower it.
    #[instrument(skip(self))]
    pub async fn record_progress(
        &self,
        chunk_id: Uuid,
        effective_processed: u64,
        progress_percent: f64,
        chunk_actual_keyspace: Option<u64>,
        crack_count: u64,
        average_speed: Option<f64>,
    ) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE chunks
                 SET effective_keyspace_processed = MAX(effective_keyspace_processed, ?2),
                     progress_percent = MAX(progress_percent, ?3),
                     chunk_actual_keyspace = COALESCE(chunk_actual_keyspace, ?4),
                     crack_count = ?5,
                     average_speed = ?6,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1",
                params![
                    chunk_id.to_string(),
                    effective_processed as i64,
                    progress_percent,
                    chunk_actual_keyspace.map(|v| v as i64),
                    crack_count as i64,
                    average_speed,
                ],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::ChunkNotFound(chunk_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn complete(&self, chunk_id: Uuid, detailed_status: DetailedStatus) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE chunks SET status = 'completed', detailed_status = ?2, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1 AND status IN ('assigned', 'running')",
                params![chunk_id.to_string(), to_sql_string(&detailed_status)],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::InvalidState);
        }
        Ok(())
    }

    /// Moves a chunk to `reconnect_pending` with a deadline; if the agent
    /// doesn't re-establish its channel before the deadline the reaper
    /// requeues it as `pending` again.
    #[instrument(skip(self))]
    pub async fn mark_reconnect_pending(&self, chunk_id: Uuid, deadline: DateTime<Utc>) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE chunks SET status = 'reconnect_pending', reconnect_deadline = ?2, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1 AND status IN ('assigned', 'running')",
                params![chunk_id.to_string(), deadline.to_rfc3339()],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::InvalidState);
        }
        Ok(())
    }

    pub async fn clear_reconnect_pending(&self, chunk_id: Uuid) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE chunks SET status = 'running', reconnect_deadline = NULL, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1 AND status = 'reconnect_pending'",
                params![chunk_id.to_string()],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::InvalidState);
        }
        Ok(())
    }

    /// Moves a chunk's planned window: both the word-position `keyspace_*`
    /// pair actually sent to the engine as `--skip`/`--limit` and the
    /// candidate-position `effective_keyspace_*` pair. Used by the progress
    /// aggregator's self-correction cascade once a job's keyspace accounting
    /// is revised. Only rewindows chunks still `pending`, since an agent may
    /// already be working an in-flight chunk's original window.
    pub async fn rewindow_pending(
        &self,
        chunk_id: Uuid,
        keyspace_start: u64,
        keyspace_end: u64,
        effective_keyspace_start: u64,
        effective_keyspace_end: u64,
    ) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE chunks SET keyspace_start = ?2, keyspace_end = ?3,
                     effective_keyspace_start = ?4, effective_keyspace_end = ?5, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1 AND status = 'pending'",
                params![
                    chunk_id.to_string(),
                    keyspace_start as i64,
                    keyspace_end as i64,
                    effective_keyspace_start as i64,
                    effective_keyspace_end as i64,
                ],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::InvalidState);
        }
        Ok(())
    }

    /// Atomic batch form of `rewindow_pending`: a job's whole rewindow
    /// cascade commits as one transaction, so a chunk that lost its pending
    /// status mid-cascade (claimed by a dispatcher tick racing the
    /// correction) fails the entire batch instead of leaving some chunks
    /// corrected and others stale.
    #[instrument(skip(self, rewindows))]
    pub async fn rewindow_pending_batch(&self, rewindows: &[(Uuid, u64, u64, u64, u64)]) -> Result<(), DbError> {
        if rewindows.is_empty() {
            return Ok(());
        }
        let connection = self.client.connection()?;
        let transaction = connection.transaction().await.map_err(|_| DbError::TransactionError)?;
        for (chunk_id, keyspace_start, keyspace_end, effective_keyspace_start, effective_keyspace_end) in rewindows {
            let affected = transaction
                .execute(
                    "UPDATE chunks SET keyspace_start = ?2, keyspace_end = ?3,
                         effective_keyspace_start = ?4, effective_keyspace_end = ?5, updated_at = CURRENT_TIMESTAMP
                     WHERE id = ?1 AND status = 'pending'",
                    params![
                        chunk_id.to_string(),
                        *keyspace_start as i64,
                        *keyspace_end as i64,
                        *effective_keyspace_start as i64,
                        *effective_keyspace_end as i64,
                    ],
                )
                .await?;
            if affected == 0 {
                return Err(DbError::InvalidState);
            }
        }
        transaction.commit().await.map_err(|_| DbError::TransactionError)?;
        Ok(())
    }

    /// Sum of every chunk's processed effective keyspace for a job, used to
    /// compute the job-level percentage complete.
    pub async fn sum_effective_processed_for_job(&self, job_id: Uuid) -> Result<u64, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection
            .query("SELECT COALESCE(SUM(effective_keyspace_processed), 0) FROM chunks WHERE job_id = ?1", params![job_id.to_string()])
            .await?;
        let sum: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(sum as u64)
    }

    /// Resolves a chunk that the agent reported as failed: requeues it as
    /// `pending` for another agent to pick up if it has retries left under
    /// `max_retry_attempts`, otherwise fails it permanently and releases it
    /// from further dispatch.
    #[instrument(skip(self))]
    pub async fn retry_or_fail(&self, chunk_id: Uuid, max_retry_attempts: u32) -> Result<ChunkStatus, DbError> {
        let chunk = self.fetch(chunk_id).await?;
        let connection = self.client.connection()?;
        if chunk.retry_count + 1 < max_retry_attempts {
            let affected = connection
                .execute(
                    "UPDATE chunks
                     SET status = 'pending', assigned_agent_id = NULL,
                         retry_count = retry_count + 1, consecutive_failures = consecutive_failures + 1,
                         updated_at = CURRENT_TIMESTAMP
                     WHERE id = ?1 AND status IN ('assigned', 'running')",
                    params![chunk_id.to_string()],
                )
                .await?;
            if affected == 0 {
                return Err(DbError::InvalidState);
            }
            warn!(chunk_id = %chunk_id, retry_count = chunk.retry_count + 1, "chunk failed, requeued for retry");
            Ok(ChunkStatus::Pending)
        } else {
            let affected = connection
                .execute(
                    "UPDATE chunks
                     SET status = 'failed', consecutive_failures = consecutive_failures + 1, updated_at = CURRENT_TIMESTAMP
                     WHERE id = ?1 AND status IN ('assigned', 'running')",
                    params![chunk_id.to_string()],
                )
                .await?;
            if affected == 0 {
                return Err(DbError::InvalidState);
            }
            warn!(chunk_id = %chunk_id, "chunk exhausted retry budget, failed permanently");
            Ok(ChunkStatus::Failed)
        }
    }

    /// Requeues chunks whose reconnect deadline has elapsed, returning them
    /// to `pending` with no assigned agent so the dispatcher can hand them
    /// to someone else. Also bumps `retry_count`/`consecutive_failures`.
    #[instrument(skip(self))]
    pub async fn requeue_expired_reconnects(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection
            .query(
                "SELECT id FROM chunks WHERE status = 'reconnect_pending' AND reconnect_deadline < ?1",
                params![now.to_rfc3339()],
            )
            .await?;
        let mut expired = Vec::new();
        while let Some(row) = rows.next().await? {
            let raw: String = row.get(0)?;
            expired.push(Uuid::parse_str(&raw).map_err(|e| DbError::MappingError(e.to_string()))?);
        }

        for chunk_id in &expired {
            connection
                .execute(
                    "UPDATE chunks
                     SET status = 'pending', assigned_agent_id = NULL, reconnect_deadline = NULL,
                         retry_count = retry_count + 1, consecutive_failures = consecutive_failures + 1,
                         updated_at = CURRENT_TIMESTAMP
                     WHERE id = ?1",
                    params![chunk_id.to_string()],
                )
                .await?;
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "reconnect deadlines expired, chunks requeued");
        }
        Ok(expired)
    }

    pub async fn list_by_job(&self, job_id: Uuid) -> Result<Vec<Chunk>, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection
            .query("SELECT * FROM chunks WHERE job_id = ?1 ORDER BY chunk_number ASC", params![job_id.to_string()])
            .await?;
        let mut chunks = Vec::new();
        while let Some(row) = rows.next().await? {
            chunks.push(map_row_to_chunk(&row)?);
        }
        Ok(chunks)
    }

    /// Chunks an agent currently holds in flight (`assigned` or `running`),
    /// used when its WebSocket connection drops to decide what needs a
    /// reconnect grace period.
    pub async fn list_in_flight_for_agent(&self, agent_id: i64) -> Result<Vec<Chunk>, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection
            .query(
                "SELECT * FROM chunks WHERE assigned_agent_id = ?1 AND status IN ('assigned', 'running')",
                params![agent_id],
            )
            .await?;
        let mut chunks = Vec::new();
        while let Some(row) = rows.next().await? {
            chunks.push(map_row_to_chunk(&row)?);
        }
        Ok(chunks)
    }

    /// Chunks sitting in `reconnect_pending` for a specific agent, consulted
    /// when that agent's websocket channel re-establishes within its grace
    /// period so the chunk can resume instead of waiting for the reaper to
    /// requeue it to someone else.
    pub async fn list_reconnect_pending_for_agent(&self, agent_id: i64) -> Result<Vec<Chunk>, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection
            .query(
                "SELECT * FROM chunks WHERE assigned_agent_id = ?1 AND status = 'reconnect_pending'",
                params![agent_id],
            )
            .await?;
        let mut chunks = Vec::new();
        while let Some(row) = rows.next().await? {
            chunks.push(map_row_to_chunk(&row)?);
        }
        Ok(chunks)
    }

    pub async fn list_pending_for_job(&self, job_id: Uuid, limit: i64) -> Result<Vec<Chunk>, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection
            .query(
                "SELECT * FROM chunks WHERE job_id = ?1 AND status = 'pending' ORDER BY chunk_number ASC LIMIT ?2",
                params![job_id.to_string(), limit],
            )
            .await?;
        let mut chunks = Vec::new();
        while let Some(row) = rows.next().await? {
            chunks.push(map_row_to_chunk(&row)?);
        }
        Ok(chunks)
    }

    /// Chunks whose `updated_at` has gone stale while `running` even though
    /// the agent's websocket channel is still open — the agent itself is
    /// alive but its progress reports have stopped arriving. Distinct from
    /// the reconnect-grace path, which only fires on an actual channel
    /// close; this is the per-chunk staleness timer from the dispatch
    /// lifecycle table (`task_heartbeat_timeout`).
    pub async fn list_stale_running(&self, timeout_secs: i64) -> Result<Vec<Chunk>, DbError> {
        let connection = self.client.connection()?;
        let cutoff = Utc::now() - Duration::seconds(timeout_secs);
        let mut rows = connection
            .query("SELECT * FROM chunks WHERE status = 'running' AND updated_at < ?1", params![cutoff.to_rfc3339()])
            .await?;
        let mut chunks = Vec::new();
        while let Some(row) = rows.next().await? {
            chunks.push(map_row_to_chunk(&row)?);
        }
        Ok(chunks)
    }

    /// Preempts a running chunk for a lower-priority job being interrupted:
    /// zeros its processed counters and returns it to `pending` with no
    /// assigned agent, per the restart-from-skip preemption policy (the
    /// engine re-dispatches it from `keyspace_start` rather than resuming
    /// a partial window).
    #[instrument(skip(self))]
    pub async fn preempt_running(&self, chunk_id: Uuid) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE chunks
                 SET status = 'pending', assigned_agent_id = NULL,
                     effective_keyspace_processed = 0, progress_percent = 0.0,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1 AND status IN ('assigned', 'running')",
                params![chunk_id.to_string()],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::InvalidState);
        }
        warn!(chunk_id = %chunk_id, "chunk preempted by a higher-priority job, requeued from scratch");
        Ok(())
    }

    /// Cancels every chunk still in flight for a job, used when a job
    /// completes early via `all_hashes_cracked` and the remaining chunks'
    /// work is now moot.
    #[instrument(skip(self))]
    pub async fn cancel_remaining_for_job(&self, job_id: Uuid) -> Result<u64, DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE chunks SET status = 'cancelled', updated_at = CURRENT_TIMESTAMP
                 WHERE job_id = ?1 AND status NOT IN ('completed', 'cancelled', 'failed')",
                params![job_id.to_string()],
            )
            .await?;
        Ok(affected)
    }
}

fn map_row_to_chunk(row: &Row) -> Result<Chunk, DbError> {
    let id: String = row.get(0)?;
    let job_id: String = row.get(1)?;
    let chunk_number: i64 = row.get(2)?;
    let assigned_agent_id: Option<i64> = row.get(3)?;
    let keyspace_start: i64 = row.get(4)?;
    let keyspace_end: i64 = row.get(5)?;
    let effective_keyspace_start: i64 = row.get(6)?;
    let effective_keyspace_end: i64 = row.get(7)?;
    let effective_keyspace_processed: i64 = row.get(8)?;
    let rule_start_index: Option<i64> = row.get(9)?;
    let rule_end_index: Option<i64> = row.get(10)?;
    let rule_chunk_path: Option<String> = row.get(11)?;
    let is_rule_split_task: bool = row.get(12)?;
    let chunk_actual_keyspace: Option<i64> = row.get(13)?;
    let status: String = row.get(14)?;
    let detailed_status: String = row.get(15)?;
    let retry_count: i64 = row.get(16)?;
    let consecutive_failures: i64 = row.get(17)?;
    let benchmark_speed: Option<i64> = row.get(18)?;
    let chunk_duration_seconds: i64 = row.get(19)?;
    let progress_percent: f64 = row.get(20)?;
    let crack_count: i64 = row.get(21)?;
    let average_speed: Option<f64> = row.get(22)?;
    let created_at: String = row.get(23)?;
    let updated_at: String = row.get(24)?;

    Ok(Chunk {
        id: Uuid::parse_str(&id).map_err(|e| DbError::MappingError(e.to_string()))?,
        job_id: Uuid::parse_str(&job_id).map_err(|e| DbError::MappingError(e.to_string()))?,
        chunk_number: chunk_number as u32,
        assigned_agent_id,
        keyspace_start: keyspace_start as u64,
        keyspace_end: keyspace_end as u64,
        effective_keyspace_start: effective_keyspace_start as u64,
        effective_keyspace_end: effective_keyspace_end as u64,
        effective_keyspace_processed: effective_keyspace_processed as u64,
        rule_start_index: rule_start_index.map(|v| v as u32),
        rule_end_index: rule_end_index.map(|v| v as u32),
        rule_chunk_path,
        is_rule_split_task,
        chunk_actual_keyspace: chunk_actual_keyspace.map(|v| v as u64),
        status: from_sql_string::<ChunkStatus>(&status)?,
        detailed_status: from_sql_string::<DetailedStatus>(&detailed_status)?,
        retry_count: retry_count as u32,
        consecutive_failures: consecutive_failures as u32,
        benchmark_speed: benchmark_speed.map(|v| v as u64),
        chunk_duration_seconds: chunk_duration_seconds as u32,
        progress_percent,
        crack_count: crack_count as u64,
        average_speed,
        created_at: crate::parse_timestamp(&created_at)?,
        updated_at: crate::parse_timestamp(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_chunk(job_id: Uuid) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            job_id,
            chunk_number: 1,
            assigned_agent_id: None,
            keyspace_start: 0,
            keyspace_end: 100_000,
            effective_keyspace_start: 0,
            effective_keyspace_end: 100_000,
            effective_keyspace_processed: 0,
            rule_start_index: None,
            rule_end_index: None,
            rule_chunk_path: None,
            is_rule_split_task: false,
            chunk_actual_keyspace: None,
            status: ChunkStatus::Pending,
            detailed_status: DetailedStatus::None,
            retry_count: 0,
            consecutive_failures: 0,
            benchmark_speed: None,
            chunk_duration_seconds: 1200,
            progress_percent: 0.0,
            crack_count: 0,
            average_speed: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn repo_over_memory() -> ChunkRepository {
        let client = DbClient::connect(":memory:", None).await.unwrap();
        ChunkRepository::new(client)
    }

    #[tokio::test]
    async fn claim_succeeds_once_and_then_conflicts() {
        let repo = repo_over_memory().await;
        let chunk = sample_chunk(Uuid::new_v4());
        repo.create(&chunk).await.unwrap();

        repo.claim(chunk.id, 7).await.unwrap();
        let second_claim = repo.claim(chunk.id, 9).await;
        assert!(matches!(second_claim, Err(DbError::ClaimConflict(_))));
    }

    #[tokio::test]
    async fn progress_never_regresses() {
        let repo = repo_over_memory().await;
        let chunk = sample_chunk(Uuid::new_v4());
        repo.create(&chunk).await.unwrap();

        repo.record_progress(chunk.id, 50_000, 50.0, Some(100_000), 2, Some(1_000.0)).await.unwrap();
        repo.record_progress(chunk.id, 20_000, 20.0, Some(100_000), 1, Some(900.0)).await.unwrap();

        let fetched = repo.fetch(chunk.id).await.unwrap();
        assert_eq!(fetched.effective_keyspace_processed, 50_000);
        assert_eq!(fetched.progress_percent, 50.0);
    }

    #[tokio::test]
    async fn expired_reconnects_are_requeued_as_pending() {
        let repo = repo_over_memory().await;
        let chunk = sample_chunk(Uuid::new_v4());
        repo.create(&chunk).await.unwrap();
        repo.claim(chunk.id, 1).await.unwrap();
        repo.mark_running(chunk.id).await.unwrap();

        let past_deadline = Utc::now() - Duration::seconds(10);
        repo.mark_reconnect_pending(chunk.id, past_deadline).await.unwrap();

        let expired = repo.requeue_expired_reconnects(Utc::now()).await.unwrap();
        assert_eq!(expired, vec![chunk.id]);

        let fetched = repo.fetch(chunk.id).await.unwrap();
        assert_eq!(fetched.status, ChunkStatus::Pending);
        assert_eq!(fetched.retry_count, 1);
        assert!(fetched.assigned_agent_id.is_none());
    }

    #[tokio::test]
    async fn in_flight_listing_only_returns_assigned_and_running() {
        let repo = repo_over_memory().await;
        let chunk = sample_chunk(Uuid::new_v4());
        repo.create(&chunk).await.unwrap();
        repo.claim(chunk.id, 3).await.unwrap();

        let in_flight = repo.list_in_flight_for_agent(3).await.unwrap();
        assert_eq!(in_flight.len(), 1);

        repo.mark_running(chunk.id).await.unwrap();
        repo.complete(chunk.id, DetailedStatus::CompletedNoCracks).await.unwrap();
        let in_flight = repo.list_in_flight_for_agent(3).await.unwrap();
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn reconnect_pending_listing_is_scoped_to_its_agent() {
        let repo = repo_over_memory().await;
        let chunk = sample_chunk(Uuid::new_v4());
        repo.create(&chunk).await.unwrap();
        repo.claim(chunk.id, 7).await.unwrap();
        repo.mark_running(chunk.id).await.unwrap();

        repo.mark_reconnect_pending(chunk.id, Utc::now() + chrono::Duration::minutes(5)).await.unwrap();

        assert_eq!(repo.list_reconnect_pending_for_agent(7).await.unwrap().len(), 1);
        assert!(repo.list_reconnect_pending_for_agent(8).await.unwrap().is_empty());

        repo.clear_reconnect_pending(chunk.id).await.unwrap();
        assert!(repo.list_reconnect_pending_for_agent(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_or_fail_requeues_while_budget_remains() {
        let repo = repo_over_memory().await;
        let chunk = sample_chunk(Uuid::new_v4());
        repo.create(&chunk).await.unwrap();
        repo.claim(chunk.id, 1).await.unwrap();

        let result = repo.retry_or_fail(chunk.id, 3).await.unwrap();
        assert_eq!(result, ChunkStatus::Pending);

        let fetched = repo.fetch(chunk.id).await.unwrap();
        assert_eq!(fetched.status, ChunkStatus::Pending);
        assert_eq!(fetched.retry_count, 1);
    }

    #[tokio::test]
    async fn retry_or_fail_fails_permanently_once_budget_exhausted() {
        let repo = repo_over_memory().await;
        let chunk = sample_chunk(Uuid::new_v4());
        repo.create(&chunk).await.unwrap();
        repo.claim(chunk.id, 1).await.unwrap();

        repo.retry_or_fail(chunk.id, 1).await.unwrap();
        let fetched = repo.fetch(chunk.id).await.unwrap();
        assert_eq!(fetched.status, ChunkStatus::Failed);
    }

    #[tokio::test]
    async fn rewindow_pending_only_applies_to_pending_chunks() {
        let repo = repo_over_memory().await;
        let chunk = sample_chunk(Uuid::new_v4());
        repo.create(&chunk).await.unwrap();

        repo.rewindow_pending(chunk.id, 5, 15, 10, 20).await.unwrap();
        let fetched = repo.fetch(chunk.id).await.unwrap();
        assert_eq!(fetched.keyspace_start, 5);
        assert_eq!(fetched.keyspace_end, 15);
        assert_eq!(fetched.effective_keyspace_start, 10);
        assert_eq!(fetched.effective_keyspace_end, 20);

        repo.claim(chunk.id, 1).await.unwrap();
        let result = repo.rewindow_pending(chunk.id, 30, 40, 30, 40).await;
        assert!(matches!(result, Err(DbError::InvalidState)));
    }

    #[tokio::test]
    async fn rewindow_pending_batch_is_all_or_nothing() {
        let repo = repo_over_memory().await;
        let job_id = Uuid::new_v4();
        let pending = sample_chunk(job_id);
        repo.create(&pending).await.unwrap();
        let already_claimed = sample_chunk(job_id);
        repo.create(&already_claimed).await.unwrap();
        repo.claim(already_claimed.id, 1).await.unwrap();

        let result = repo
            .rewindow_pending_batch(&[(pending.id, 10, 20, 10, 20), (already_claimed.id, 30, 40, 30, 40)])
            .await;
        assert!(matches!(result, Err(DbError::InvalidState)));

        let fetched = repo.fetch(pending.id).await.unwrap();
        assert_eq!(fetched.keyspace_start, 0, "the whole batch must roll back when one chunk in it fails");
        assert_eq!(fetched.keyspace_end, 100_000);
    }

    #[tokio::test]
    async fn sum_effective_processed_for_job_adds_every_chunk() {
        let repo = repo_over_memory().await;
        let job_id = Uuid::new_v4();
        let first = sample_chunk(job_id);
        let mut second = sample_chunk(job_id);
        second.id = Uuid::new_v4();
        repo.create(&first).await.unwrap();
        repo.create(&second).await.unwrap();

        repo.record_progress(first.id, 30_000, 30.0, None, 0, None).await.unwrap();
        repo.record_progress(second.id, 45_000, 45.0, None, 0, None).await.unwrap();

        assert_eq!(repo.sum_effective_processed_for_job(job_id).await.unwrap(), 75_000);
    }

    #[tokio::test]
    async fn completing_a_chunk_not_in_flight_is_rejected() {
        let repo = repo_over_memory().await;
        let chunk = sample_chunk(Uuid::new_v4());
        repo.create(&chunk).await.unwrap();

        let result = repo.complete(chunk.id, DetailedStatus::CompletedNoCracks).await;
        assert!(matches!(result, Err(DbError::InvalidState)));
    }

    #[tokio::test]
    async fn preempting_a_running_chunk_zeroes_progress_and_requeues_it() {
        let repo = repo_over_memory().await;
        let chunk = sample_chunk(Uuid::new_v4());
        repo.create(&chunk).await.unwrap();
        repo.claim(chunk.id, 4).await.unwrap();
        repo.mark_running(chunk.id).await.unwrap();
        repo.record_progress(chunk.id, 50_000, 50.0, Some(100_000), 0, Some(1_000.0)).await.unwrap();

        repo.preempt_running(chunk.id).await.unwrap();

        let fetched = repo.fetch(chunk.id).await.unwrap();
        assert_eq!(fetched.status, ChunkStatus::Pending);
        assert!(fetched.assigned_agent_id.is_none());
        assert_eq!(fetched.effective_keyspace_processed, 0);
        assert_eq!(fetched.progress_percent, 0.0);
    }

    #[tokio::test]
    async fn preempting_a_chunk_that_is_not_in_flight_is_rejected() {
        let repo = repo_over_memory().await;
        let chunk = sample_chunk(Uuid::new_v4());
        repo.create(&chunk).await.unwrap();

        let result = repo.preempt_running(chunk.id).await;
        assert!(matches!(result, Err(DbError::InvalidState)));
    }

    #[tokio::test]
    async fn stale_running_listing_only_returns_chunks_past_the_timeout() {
        let repo = repo_over_memory().await;
        let chunk = sample_chunk(Uuid::new_v4());
        repo.create(&chunk).await.unwrap();
        repo.claim(chunk.id, 1).await.unwrap();
        repo.mark_running(chunk.id).await.unwrap();

        assert!(repo.list_stale_running(300).await.unwrap().is_empty());
        assert_eq!(repo.list_stale_running(0).await.unwrap().len(), 1);
    }
}
