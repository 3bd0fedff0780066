// [libs/domain/models/src/job.rs]
/*!
 * Job domain model. One row per user request: an attack configuration
 * plus the self-correcting keyspace accounting the progress aggregator
 * updates as chunks report their true effective total.
 */

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The strategy the cracking engine uses to generate candidate passwords.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttackMode {
    Dictionary,
    Combination,
    Mask,
    HybridWordlistMask,
    HybridMaskWordlist,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Interrupted,
}

impl JobStatus {
    /// Terminal statuses are monotonic: once reached, no transition back
    /// to `Running` is permitted.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackConfig {
    pub mode: AttackMode,
    pub wordlist_refs: Vec<String>,
    pub rule_file_refs: Vec<String>,
    pub mask: Option<String>,
}

/// Keyspace accounting fields. `base_keyspace` is the
/// wordlist-only count; `effective_keyspace` is the true candidate count
/// after rule expansion; `total_keyspace` is what users see and equals
/// `effective_keyspace` once rule splitting or keyspace accuracy kicks in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyspaceAccounting {
    pub base_keyspace: u64,
    pub total_keyspace: u64,
    pub effective_keyspace: u64,
    pub dispatched_keyspace: u64,
    pub is_accurate_keyspace: bool,
    pub avg_rule_multiplier: f64,
}

impl KeyspaceAccounting {
    pub fn naive(base_keyspace: u64, rule_count: u64) -> Self {
        let multiplier = rule_count.max(1);
        let effective = base_keyspace.saturating_mul(multiplier);
        Self {
            base_keyspace,
            total_keyspace: effective,
            effective_keyspace: effective,
            dispatched_keyspace: 0,
            is_accurate_keyspace: false,
            avg_rule_multiplier: multiplier as f64,
        }
    }

    /// Invariant check used in tests and defensively at persistence
    /// boundaries: `dispatched_keyspace` never exceeds `max(total, effective)`.
    pub fn dispatched_within_bounds(&self) -> bool {
        self.dispatched_keyspace <= self.total_keyspace.max(self.effective_keyspace)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub hashlist_id: Uuid,
    pub hash_algorithm_id: u32,
    pub priority: i32,
    pub attack: AttackConfig,
    pub keyspace: KeyspaceAccounting,
    pub uses_rule_splitting: bool,
    pub rule_split_count: u32,
    pub status: JobStatus,
    pub consecutive_failures: u32,
    pub max_agents: Option<u32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,

    /// Job-wide percentage complete, summed across every chunk's processed
    /// effective keyspace. Monotonically non-decreasing; see `raw_percent_complete`.
    pub progress_percent: f64,
}

impl Job {
    /// Job-level percentage complete, in effective-keyspace units. Callers
    /// are responsible for clamping this to the previous maximum so the
    /// reported percentage never regresses.
    pub fn raw_percent_complete(&self, effective_processed: u64) -> f64 {
        if self.keyspace.total_keyspace == 0 {
            return 0.0;
        }
        (effective_processed as f64 / self.keyspace.total_keyspace as f64 * 100.0).min(100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naive_accounting_multiplies_rule_count() {
        let k = KeyspaceAccounting::naive(100_000, 10);
        assert_eq!(k.effective_keyspace, 1_000_000);
        assert!(!k.is_accurate_keyspace);
    }

    #[test]
    fn terminal_statuses_are_identified() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Interrupted.is_terminal());
    }
}
