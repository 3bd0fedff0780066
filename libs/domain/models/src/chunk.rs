// [libs/domain/models/src/chunk.rs]
/*!
 * Chunk (task) domain model. One row per unit of work; lifecycle owned
 * jointly by the dispatcher and the progress aggregator.
 */

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
    ReconnectPending,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DetailedStatus {
    CompletedWithCracks,
    CompletedNoCracks,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub job_id: Uuid,
    pub chunk_number: u32,
    pub assigned_agent_id: Option<i64>,

    /// Word-position window into the wordlist, half-open.
    pub keyspace_start: u64,
    pub keyspace_end: u64,

    /// Candidate-position window; differs from the word window when rules
    /// multiply the stream.
    pub effective_keyspace_start: u64,
    pub effective_keyspace_end: u64,
    pub effective_keyspace_processed: u64,

    pub rule_start_index: Option<u32>,
    pub rule_end_index: Option<u32>,
    pub rule_chunk_path: Option<String>,
    pub is_rule_split_task: bool,

    /// True total reported by the engine on its first status update for
    /// this chunk; once populated it supersedes the planned effective
    /// window for progress-percentage purposes.
    pub chunk_actual_keyspace: Option<u64>,

    pub status: ChunkStatus,
    pub detailed_status: DetailedStatus,
    pub retry_count: u32,
    pub consecutive_failures: u32,
    pub benchmark_speed: Option<u64>,
    pub chunk_duration_seconds: u32,
    pub progress_percent: f64,
    pub crack_count: u64,
    pub average_speed: Option<f64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Chunk {
    pub fn effective_window_size(&self) -> u64 {
        self.effective_keyspace_end.saturating_sub(self.effective_keyspace_start)
    }

    /// The word-position window actually sent to the engine as `--skip`/`--limit`,
    /// as opposed to `effective_window_size`'s candidate-position window.
    pub fn word_window_size(&self) -> u64 {
        self.keyspace_end.saturating_sub(self.keyspace_start)
    }

    /// Progress fraction for this chunk once the engine has reported an
    /// accurate total, at which point progress is current / actual total.
    /// Falls back to the planned window otherwise.
    pub fn progress_fraction(&self, current: u64) -> f64 {
        let denominator = self.chunk_actual_keyspace.unwrap_or_else(|| self.effective_window_size());
        if denominator == 0 {
            return 0.0;
        }
        (current as f64 / denominator as f64).min(1.0)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.status, ChunkStatus::Assigned | ChunkStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_chunk() -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
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

    #[test]
    fn progress_fraction_uses_actual_once_observed() {
        let mut chunk = sample_chunk();
        assert_eq!(chunk.progress_fraction(50_000), 0.5);

        chunk.chunk_actual_keyspace = Some(95_000);
        assert!((chunk.progress_fraction(95_000) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn in_flight_statuses() {
        let mut chunk = sample_chunk();
        chunk.status = ChunkStatus::Assigned;
        assert!(chunk.is_in_flight());
        chunk.status = ChunkStatus::ReconnectPending;
        assert!(!chunk.is_in_flight());
    }
}
