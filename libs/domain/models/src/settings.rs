// [libs/domain/models/src/settings.rs]
/*!
 * Runtime-tunable scheduler knobs. Follows the `system_state` key-value
 * table pattern: defaults live here in code, and the coordinator's
 * settings repository hydrates overrides from persistence at boot,
 * falling back to these defaults when a row is absent.
 */

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerSettings {
    pub default_chunk_duration_secs: u32,
    pub chunk_fluctuation_percentage: u8,
    pub min_chunk_duration_secs: u32,
    pub max_chunk_duration_secs: u32,
    pub progress_reporting_interval_secs: u32,
    pub task_heartbeat_timeout_secs: u32,
    pub agent_heartbeat_timeout_secs: u32,
    pub reconnect_grace_period_secs: u32,
    pub max_chunk_retry_attempts: u32,
    pub max_hashcat_retries: u32,
    pub hashcat_retry_delay_secs: u32,
    pub rule_split_enabled: bool,
    pub rule_split_threshold: f64,
    pub rule_split_min_rules: u32,
    pub rule_split_max_chunks: u32,
    pub job_interruption_enabled: bool,
    pub job_interruption_priority_threshold: i32,
    pub job_interruption_grace_period_secs: u32,
    pub agent_scheduling_enabled: bool,
    pub max_job_priority: i32,
    pub scheduler_check_interval_secs: u32,
    pub max_concurrent_downloads_per_agent: u32,
    pub job_max_consecutive_failures: u32,
    pub crack_batch_max_entries: u32,
    pub crack_batch_max_delay_millis: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            default_chunk_duration_secs: 1200,
            chunk_fluctuation_percentage: 20,
            min_chunk_duration_secs: 300,
            max_chunk_duration_secs: 7200,
            progress_reporting_interval_secs: 5,
            task_heartbeat_timeout_secs: 5 * 60,
            agent_heartbeat_timeout_secs: 60,
            reconnect_grace_period_secs: 5 * 60,
            max_chunk_retry_attempts: 3,
            max_hashcat_retries: 5,
            hashcat_retry_delay_secs: 5,
            rule_split_enabled: true,
            rule_split_threshold: 2.0,
            rule_split_min_rules: 100,
            rule_split_max_chunks: 1000,
            job_interruption_enabled: false,
            job_interruption_priority_threshold: 500,
            job_interruption_grace_period_secs: 30,
            agent_scheduling_enabled: false,
            max_job_priority: 1000,
            scheduler_check_interval_secs: 10,
            max_concurrent_downloads_per_agent: 3,
            job_max_consecutive_failures: 5,
            crack_batch_max_entries: 50,
            crack_batch_max_delay_millis: 100,
        }
    }
}

impl SchedulerSettings {
    pub fn clamped_chunk_duration(&self, requested: u32) -> u32 {
        requested.clamp(self.min_chunk_duration_secs, self.max_chunk_duration_secs)
    }
}
