// [libs/infra/db/src/repositories/job_repository.rs]
/*!
 * Persistence for jobs, including the self-correcting keyspace cascade:
 * a job is planned with a naive rule-multiplier estimate, then refined as
 * a running weighted average every time a chunk reports its true effective
 * total, so the estimate keeps tightening across the job's whole lifetime
 * rather than locking after the first observation.
 */

use crate::errors::DbError;
use crate::sql_enum::{from_sql_string, to_sql_string};
use crate::DbClient;
use libsql::{params, Row};
use prospector_domain_models::job::{AttackConfig, AttackMode, Job, JobStatus, KeyspaceAccounting};
use tracing::{info, instrument};
use uuid::Uuid;

pub struct JobRepository {
    client: DbClient,
}

impl JobRepository {
    pub fn new(client: DbClient) -> Self {
        Self { client }
    }

    #[instrument(skip(self, job))]
    pub async fn create(&self, job: &Job) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        connection
            .execute(
                "INSERT INTO jobs (
                    id, hashlist_id, hash_algorithm_id, priority, attack_mode,
                    wordlist_refs, rule_file_refs, mask,
                    base_keyspace, total_keyspace, effective_keyspace, dispatched_keyspace,
                    is_accurate_keyspace, avg_rule_multiplier,
                    uses_rule_splitting, rule_split_count, status, consecutive_failures, max_agents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                params![
                    job.id.to_string(),
                    job.hashlist_id.to_string(),
                    job.hash_algorithm_id as i64,
                    job.priority as i64,
                    to_sql_string(&job.attack.mode),
                    serde_json::to_string(&job.attack.wordlist_refs).map_err(|e| DbError::MappingError(e.to_string()))?,
                    serde_json::to_string(&job.attack.rule_file_refs).map_err(|e| DbError::MappingError(e.to_string()))?,
                    job.attack.mask.clone(),
                    job.keyspace.base_keyspace as i64,
                    job.keyspace.total_keyspace as i64,
                    job.keyspace.effective_keyspace as i64,
                    job.keyspace.dispatched_keyspace as i64,
                    if job.keyspace.is_accurate_keyspace { 1 } else { 0 },
                    job.keyspace.avg_rule_multiplier,
                    if job.uses_rule_splitting { 1 } else { 0 },
                    job.rule_split_count as i64,
                    to_sql_string(&job.status),
                    job.consecutive_failures as i64,
                    job.max_agents.map(|v| v as i64),
                ],
            )
            .await?;
        info!(job_id = %job.id, "job inserted");
        Ok(())
    }

    pub async fn fetch(&self, id: Uuid) -> Result<Job, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection
            .query("SELECT * FROM jobs WHERE id = ?1", params![id.to_string()])
            .await?;
        match rows.next().await? {
            Some(row) => map_row_to_job(&row),
            None => Err(DbError::JobNotFound(id)),
        }
    }

    /// Jobs eligible for dispatch, highest priority and oldest first.
    pub async fn list_dispatchable(&self, limit: i64) -> Result<Vec<Job>, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection
            .query(
                "SELECT * FROM jobs WHERE status IN ('pending', 'running')
                 ORDER BY priority DESC, created_at ASC LIMIT ?1",
                params![limit],
            )
            .await?;
        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await? {
            jobs.push(map_row_to_job(&row)?);
        }
        Ok(jobs)
    }

    /// Transitions a job's status. Refuses to move a job out of a terminal
    /// state; the zero-rows-affected case maps to `InvalidState` rather
    /// than silently succeeding.
    #[instrument(skip(self))]
    pub async fn transition_status(&self, id: Uuid, to: JobStatus) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE jobs SET status = ?2, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1
                 AND status NOT IN ('completed', 'failed', 'cancelled')",
                params![id.to_string(), to_sql_string(&to)],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::InvalidState);
        }
        Ok(())
    }

    /// Folds one chunk's observed actual-vs-planned effective keyspace into
    /// the job's running weighted average: `avg_rule_multiplier` becomes
    /// `Σ(actual) / Σ(base_keyspace_per_chunk)` across every chunk that has
    /// reported so far, not just the first. `effective_keyspace` and
    /// `total_keyspace` are re-derived from that average on every call, so
    /// the estimate keeps tightening as more chunks report instead of
    /// locking after the first observation.
    #[instrument(skip(self))]
    pub async fn apply_keyspace_observation(
        &self,
        id: Uuid,
        chunk_base_keyspace: u64,
        chunk_actual_effective_keyspace: u64,
    ) -> Result<KeyspaceAccounting, DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE jobs
                 SET keyspace_observed_actual_sum = keyspace_observed_actual_sum + ?2,
                     keyspace_observed_base_sum = keyspace_observed_base_sum + ?3,
                     avg_rule_multiplier =
                         CAST(keyspace_observed_actual_sum + ?2 AS REAL) / MAX(keyspace_observed_base_sum + ?3, 1),
                     effective_keyspace =
                         CAST(ROUND(base_keyspace * (CAST(keyspace_observed_actual_sum + ?2 AS REAL) / MAX(keyspace_observed_base_sum + ?3, 1))) AS INTEGER),
                     total_keyspace =
                         CAST(ROUND(base_keyspace * (CAST(keyspace_observed_actual_sum + ?2 AS REAL) / MAX(keyspace_observed_base_sum + ?3, 1))) AS INTEGER),
                     is_accurate_keyspace = 1,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1",
                params![id.to_string(), chunk_actual_effective_keyspace as i64, chunk_base_keyspace as i64],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::JobNotFound(id));
        }
        let job = self.fetch(id).await?;
        info!(
            job_id = %id,
            avg_rule_multiplier = job.keyspace.avg_rule_multiplier,
            effective_keyspace = job.keyspace.effective_keyspace,
            "keyspace observation folded into the running weighted average"
        );
        Ok(job.keyspace)
    }

    /// Job-level percentage complete. Monotonic: folding in a stale sum can
    /// only raise the stored watermark, never lower it.
    #[instrument(skip(self))]
    pub async fn record_progress_percent(&self, id: Uuid, percent: f64) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE jobs SET progress_percent = MAX(progress_percent, ?2), updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1",
                params![id.to_string(), percent],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::JobNotFound(id));
        }
        Ok(())
    }

    pub async fn increment_dispatched_keyspace(&self, id: Uuid, amount: u64) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE jobs SET dispatched_keyspace = dispatched_keyspace + ?2, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1",
                params![id.to_string(), amount as i64],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::JobNotFound(id));
        }
        Ok(())
    }

    pub async fn record_chunk_failure(&self, id: Uuid) -> Result<u32, DbError> {
        let connection = self.client.connection()?;
        connection
            .execute(
                "UPDATE jobs SET consecutive_failures = consecutive_failures + 1, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        let job = self.fetch(id).await?;
        Ok(job.consecutive_failures)
    }

    pub async fn reset_consecutive_failures(&self, id: Uuid) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        connection
            .execute(
                "UPDATE jobs SET consecutive_failures = 0, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        Ok(())
    }
}

fn map_row_to_job(row: &Row) -> Result<Job, DbError> {
    let id: String = row.get(0)?;
    let hashlist_id: String = row.get(1)?;
    let hash_algorithm_id: i64 = row.get(2)?;
    let priority: i64 = row.get(3)?;
    let attack_mode: String = row.get(4)?;
    let wordlist_refs: String = row.get(5)?;
    let rule_file_refs: String = row.get(6)?;
    let mask: Option<String> = row.get(7)?;
    let base_keyspace: i64 = row.get(8)?;
    let total_keyspace: i64 = row.get(9)?;
    let effective_keyspace: i64 = row.get(10)?;
    let dispatched_keyspace: i64 = row.get(11)?;
    let is_accurate_keyspace: bool = row.get(12)?;
    let avg_rule_multiplier: f64 = row.get(13)?;
    let uses_rule_splitting: bool = row.get(14)?;
    let rule_split_count: i64 = row.get(15)?;
    let status: String = row.get(16)?;
    let consecutive_failures: i64 = row.get(17)?;
    let max_agents: Option<i64> = row.get(18)?;
    let created_at: String = row.get(19)?;
    let updated_at: String = row.get(20)?;
    let progress_percent: f64 = row.get(21)?;

    let attack = AttackConfig {
        mode: from_sql_string::<AttackMode>(&attack_mode)?,
        wordlist_refs: serde_json::from_str(&wordlist_refs).map_err(|e| DbError::MappingError(e.to_string()))?,
        rule_file_refs: serde_json::from_str(&rule_file_refs).map_err(|e| DbError::MappingError(e.to_string()))?,
        mask,
    };

    let keyspace = KeyspaceAccounting {
        base_keyspace: base_keyspace as u64,
        total_keyspace: total_keyspace as u64,
        effective_keyspace: effective_keyspace as u64,
        dispatched_keyspace: dispatched_keyspace as u64,
        is_accurate_keyspace,
        avg_rule_multiplier,
    };

    Ok(Job {
        id: Uuid::parse_str(&id).map_err(|e| DbError::MappingError(e.to_string()))?,
        hashlist_id: Uuid::parse_str(&hashlist_id).map_err(|e| DbError::MappingError(e.to_string()))?,
        hash_algorithm_id: hash_algorithm_id as u32,
        priority: priority as i32,
        attack,
        keyspace,
        uses_rule_splitting,
        rule_split_count: rule_split_count as u32,
        status: from_sql_string::<JobStatus>(&status)?,
        consecutive_failures: consecutive_failures as u32,
        max_agents: max_agents.map(|v| v as u32),
        created_at: crate::parse_timestamp(&created_at)?,
        updated_at: crate::parse_timestamp(&updated_at)?,
        progress_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_domain_models::job::AttackMode;

    fn sample_job() -> Job {
        Job {
            id: Uuid::new_v4(),
            hashlist_id: Uuid::new_v4(),
            hash_algorithm_id: 1000,
            priority: 5,
            attack: AttackConfig {
                mode: AttackMode::Dictionary,
                wordlist_refs: vec!["rockyou.txt".into()],
                rule_file_refs: vec![],
                mask: None,
            },
            keyspace: KeyspaceAccounting::naive(1_000_000, 1),
            uses_rule_splitting: false,
            rule_split_count: 0,
            status: JobStatus::Pending,
            consecutive_failures: 0,
            max_agents: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            progress_percent: 0.0,
        }
    }

    async fn repo_over_memory() -> JobRepository {
        let client = DbClient::connect(":memory:", None).await.unwrap();
        JobRepository::new(client)
    }

    #[tokio::test]
    async fn created_job_round_trips() {
        let repo = repo_over_memory().await;
        let job = sample_job();
        repo.create(&job).await.unwrap();

        let fetched = repo.fetch(job.id).await.unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.attack.wordlist_refs, job.attack.wordlist_refs);
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn keyspace_observation_keeps_refining_as_more_chunks_report() {
        let repo = repo_over_memory().await;
        let job = sample_job();
        repo.create(&job).await.unwrap();

        let after_first = repo.apply_keyspace_observation(job.id, 100_000, 420_000).await.unwrap();
        assert!((after_first.avg_rule_multiplier - 4.2).abs() < f64::EPSILON);
        assert_eq!(after_first.effective_keyspace, 4_200_000);

        // A second chunk reporting a much higher multiplier shifts the
        // weighted average rather than being ignored by a one-time lock.
        let after_second = repo.apply_keyspace_observation(job.id, 100_000, 900_000).await.unwrap();
        assert!((after_second.avg_rule_multiplier - 6.6).abs() < 1e-9);
        assert_eq!(after_second.effective_keyspace, 6_600_000);
        assert_eq!(after_second.total_keyspace, 6_600_000);
        assert!(after_second.is_accurate_keyspace);
    }

    #[tokio::test]
    async fn job_progress_percent_never_regresses() {
        let repo = repo_over_memory().await;
        let job = sample_job();
        repo.create(&job).await.unwrap();

        repo.record_progress_percent(job.id, 40.0).await.unwrap();
        repo.record_progress_percent(job.id, 10.0).await.unwrap();

        let fetched = repo.fetch(job.id).await.unwrap();
        assert_eq!(fetched.progress_percent, 40.0);
    }

    #[tokio::test]
    async fn status_transition_is_rejected_once_terminal() {
        let repo = repo_over_memory().await;
        let job = sample_job();
        repo.create(&job).await.unwrap();

        repo.transition_status(job.id, JobStatus::Completed).await.unwrap();
        let result = repo.transition_status(job.id, JobStatus::Running).await;
        assert!(matches!(result, Err(DbError::InvalidState)));
    }

    #[tokio::test]
    async fn fetching_unknown_job_errors() {
        let repo = repo_over_memory().await;
        let result = repo.fetch(Uuid::new_v4()).await;
        assert!(matches!(result, Err(DbError::JobNotFound(_))));
    }
}
