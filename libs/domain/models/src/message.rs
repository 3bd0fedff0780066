// [libs/domain/models/src/message.rs]
/*!
 * Agent <-> coordinator message schema. Every message shares the
 * `{type, id, timestamp, payload}` envelope; `MessageKind` carries the
 * payload so a tagged-union shape round-trips cleanly over JSON (the WS
 * wire format) and bincode (the agent's durable outbox).
 */

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub kind: MessageKind,
}

impl MessageEnvelope {
    pub fn new(kind: MessageKind) -> Self {
        Self { id: Uuid::new_v4(), timestamp: chrono::Utc::now(), kind }
    }

    /// Critical messages are the ones the agent-side outbox must persist
    /// durably: anything carrying cracked hashes, plus
    /// terminal task status transitions. Everything else (heartbeats, live
    /// progress) is lossy — dropping one just means the next one supersedes it.
    pub fn is_critical(&self) -> bool {
        match &self.kind {
            MessageKind::CrackedBatch(_) => true,
            MessageKind::TaskProgress(progress) => progress.status.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentReportedStatus {
    Running,
    Completed,
    ExhaustedNoCracks,
    Aborted,
    GpuWatchdogAlarm,
    AlreadyRunningRetryable,
    Failed,
}

impl AgentReportedStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AgentReportedStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceMetrics {
    pub device_id: u32,
    pub hashrate: u64,
    pub temperature_celsius: Option<f32>,
    pub utilization_percent: Option<f32>,
    pub fan_speed_percent: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignmentPayload {
    pub task_id: Uuid,
    pub job_execution_id: Uuid,
    pub hashlist_id: Uuid,
    pub hashlist_path: String,
    pub attack_mode: String,
    pub hash_type: u32,
    pub keyspace_start: u64,
    pub keyspace_end: u64,
    pub wordlist_paths: Vec<String>,
    pub rule_paths: Vec<String>,
    pub mask: Option<String>,
    pub binary_path: String,
    pub chunk_duration: u32,
    pub report_interval: u32,
    pub extra_parameters: Vec<String>,
    pub enabled_devices: Vec<u32>,
    pub effective_keyspace_start: u64,
    pub effective_keyspace_end: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgressPayload {
    pub task_id: Uuid,
    pub keyspace_processed: u64,
    pub effective_progress: u64,
    pub progress_percent: f64,
    pub total_effective_keyspace: Option<u64>,
    pub is_first_update: bool,
    pub hash_rate: u64,
    pub time_remaining_secs: Option<u64>,
    pub cracked_count: u64,
    pub cracked_hashes: Vec<CrackedEntry>,
    pub status: AgentReportedStatus,
    pub error_message: Option<String>,
    pub device_metrics: Vec<DeviceMetrics>,
    pub all_hashes_cracked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrackedEntry {
    pub hash: String,
    pub plain: String,
    pub crack_pos: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrackedBatchPayload {
    pub task_id: Uuid,
    pub cracks: Vec<CrackedEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusPayload {
    pub status: String,
    pub device_metrics: Vec<DeviceMetrics>,
    pub sync_status: String,
    pub files_to_sync: u32,
    pub files_synced: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRequestPayload {
    pub hash_type: u32,
    pub attack_mode: String,
    pub devices: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResultPayload {
    pub hash_type: u32,
    pub attack_mode: String,
    pub devices: Vec<u32>,
    pub total_speed: u64,
    pub total_effective_keyspace: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSyncRequestPayload {
    pub category: String,
    pub name: String,
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MessageKind {
    Heartbeat,
    AgentStatus(AgentStatusPayload),
    TaskAssignment(TaskAssignmentPayload),
    TaskProgress(TaskProgressPayload),
    CrackedBatch(CrackedBatchPayload),
    BenchmarkRequest(BenchmarkRequestPayload),
    BenchmarkResult(BenchmarkResultPayload),
    FileSyncRequest(FileSyncRequestPayload),
    TaskCancellation { task_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_round_trips_through_json() {
        let envelope = MessageEnvelope::new(MessageKind::Heartbeat);
        let json = serde_json::to_string(&envelope).unwrap();
        let decoded: MessageEnvelope = serde_json::from_str(&json).unwrap();
        assert!(matches!(decoded.kind, MessageKind::Heartbeat));
    }

    #[test]
    fn cracked_batch_is_critical() {
        let envelope = MessageEnvelope::new(MessageKind::CrackedBatch(CrackedBatchPayload {
            task_id: Uuid::new_v4(),
            cracks: vec![],
        }));
        assert!(envelope.is_critical());
    }

    #[test]
    fn live_heartbeat_is_not_critical() {
        let envelope = MessageEnvelope::new(MessageKind::Heartbeat);
        assert!(!envelope.is_critical());
    }

    #[test]
    fn terminal_progress_is_critical() {
        let envelope = MessageEnvelope::new(MessageKind::TaskProgress(TaskProgressPayload {
            task_id: Uuid::new_v4(),
            keyspace_processed: 100,
            effective_progress: 100,
            progress_percent: 100.0,
            total_effective_keyspace: Some(100),
            is_first_update: false,
            hash_rate: 0,
            time_remaining_secs: None,
            cracked_count: 0,
            cracked_hashes: vec![],
            status: AgentReportedStatus::Completed,
            error_message: None,
            device_metrics: vec![],
            all_hashes_cracked: false,
        }));
        assert!(envelope.is_critical());
    }
}
