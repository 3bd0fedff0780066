// [apps/coordinator/src/services/crack_pipeline.rs]
//! Ingests cracked hashes reported by an agent, idempotently (replayed
//! deliveries of the same crack are no-ops at the repository layer), and
//! closes out a job as soon as every hash in its hashlist is cracked.

use prospector_domain_models::chunk::DetailedStatus;
use prospector_domain_models::job::JobStatus;
use prospector_domain_models::message::CrackedEntry;
use tracing::info;
use uuid::Uuid;

use crate::state::AppState;

/// Records a batch of cracks against a hashlist and, if that batch happens
/// to complete the hashlist, cancels the job's remaining in-flight chunks
/// and marks the job `Completed`. Returns whether the job was completed.
pub async fn record_cracks_and_maybe_complete_job(
    state: &AppState,
    job_id: Uuid,
    hashlist_id: Uuid,
    cracked_by_chunk_id: Uuid,
    entries: &[CrackedEntry],
) -> anyhow::Result<bool> {
    for entry in entries {
        let recorded = state
            .hash_repository
            .record_crack(hashlist_id, &entry.hash, &entry.plain, cracked_by_chunk_id)
            .await?;
        if recorded {
            info!(hashlist_id = %hashlist_id, chunk_id = %cracked_by_chunk_id, "crack ingested");
        }
    }

    let hashlist = state.hash_repository.fetch_hashlist(hashlist_id).await?;
    if hashlist.is_fully_cracked() {
        let cancelled = state.chunk_repository.cancel_remaining_for_job(job_id).await?;
        state.job_repository.transition_status(job_id, JobStatus::Completed).await.ok();
        info!(job_id = %job_id, cancelled_chunks = cancelled, "hashlist fully cracked, job completed early");
        return Ok(true);
    }
    Ok(false)
}

pub fn detailed_status_for(crack_count: u64) -> DetailedStatus {
    if crack_count > 0 {
        DetailedStatus::CompletedWithCracks
    } else {
        DetailedStatus::CompletedNoCracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_domain_models::hash::{Hash, Hashlist};
    use prospector_domain_models::job::{AttackConfig, AttackMode, Job, KeyspaceAccounting};
    use prospector_infra_db::DbClient;

    async fn state_over_memory() -> AppState {
        let client = DbClient::connect(":memory:", None).await.unwrap();
        AppState::new(client, std::env::temp_dir(), "test-token".into(), "hashcat".into(), Default::default())
    }

    #[tokio::test]
    async fn completing_the_last_hash_completes_the_job() {
        let state = state_over_memory().await;
        let hashlist = Hashlist { id: Uuid::new_v4(), name: "t".into(), hash_algorithm_id: 0, total_count: 0, cracked_count: 0, exclude_from_potfile: false };
        state.hash_repository.create_hashlist(&hashlist).await.unwrap();
        let hash = Hash { id: Uuid::new_v4(), hash_value: "deadbeef".into(), username: None, domain: None, hash_algorithm_id: 0, is_cracked: false, plaintext: None, last_updated: chrono::Utc::now() };
        state.hash_repository.bulk_insert(hashlist.id, &[hash]).await.unwrap();

        let job = Job {
            id: Uuid::new_v4(),
            hashlist_id: hashlist.id,
            hash_algorithm_id: 0,
            priority: 0,
            attack: AttackConfig { mode: AttackMode::Dictionary, wordlist_refs: vec![], rule_file_refs: vec![], mask: None },
            keyspace: KeyspaceAccounting::naive(1, 1),
            uses_rule_splitting: false,
            rule_split_count: 0,
            status: JobStatus::Running,
            consecutive_failures: 0,
            max_agents: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            progress_percent: 0.0,
        };
        state.job_repository.create(&job).await.unwrap();

        let entries = vec![CrackedEntry { hash: "deadbeef".into(), plain: "hunter2".into(), crack_pos: None }];
        let completed = record_cracks_and_maybe_complete_job(&state, job.id, hashlist.id, Uuid::new_v4(), &entries).await.unwrap();
        assert!(completed);

        let fetched = state.job_repository.fetch(job.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
    }
}
