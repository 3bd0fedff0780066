// [libs/domain/models/src/agent.rs]
/*!
 * Agent domain model. Tracks liveness, file-sync status and the device
 * roster the planner/dispatcher reason about.
 */

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentLiveness {
    Inactive,
    Active,
    Busy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_id: u32,
    pub name: String,
    pub enabled: bool,
    pub memory_mb: u64,
    pub driver_version: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScheduleWindow {
    /// 0 = Sunday .. 6 = Saturday, matching `chrono::Weekday::num_days_from_sunday`.
    pub day_of_week: u8,
    pub start_utc_minute_of_day: u16,
    pub end_utc_minute_of_day: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    pub owner: String,
    pub claim_code_limit: u32,
    pub enabled: bool,
    pub status: AgentLiveness,
    pub last_heartbeat: Option<chrono::DateTime<chrono::Utc>>,
    pub consecutive_failures: u32,
    pub sync_status: SyncStatus,
    pub files_to_sync: u32,
    pub files_synced: u32,
    pub sync_error: Option<String>,
    pub devices: Vec<Device>,
    pub schedule: Vec<ScheduleWindow>,
    pub current_task_id: Option<uuid::Uuid>,
}

impl Agent {
    /// An agent holds at most one task in {assigned, running} at any time.
    /// This is advisory on the in-memory model; the persistence layer's
    /// `claimChunk` is the actual enforcement point (it is atomic with the
    /// agent's busy flag).
    pub fn holds_a_task(&self) -> bool {
        self.current_task_id.is_some()
    }

    /// File-sync gate: an agent mid-transfer can't start pulling a new
    /// job's inputs, and one stuck in `failed` needs attention before it's
    /// handed more work. `pending` (never yet asked to sync anything) and
    /// `completed` are both fine.
    pub fn is_eligible_for_dispatch(&self) -> bool {
        self.enabled
            && self.status == AgentLiveness::Active
            && !self.holds_a_task()
            && matches!(self.sync_status, SyncStatus::Pending | SyncStatus::Completed)
    }

    pub fn is_disconnected(&self, now: chrono::DateTime<chrono::Utc>, heartbeat_timeout_secs: i64) -> bool {
        match self.last_heartbeat {
            Some(last) => (now - last).num_seconds() > heartbeat_timeout_secs,
            None => true,
        }
    }

    pub fn within_schedule(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        if self.schedule.is_empty() {
            return true;
        }
        let day = now.weekday().num_days_from_sunday() as u8;
        let minute_of_day = (now.time().num_seconds_from_midnight() / 60) as u16;
        self.schedule.iter().any(|window| {
            window.day_of_week == day
                && minute_of_day >= window.start_utc_minute_of_day
                && minute_of_day < window.end_utc_minute_of_day
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn base_agent() -> Agent {
        Agent {
            id: 1,
            owner: "tester".into(),
            claim_code_limit: 1,
            enabled: true,
            status: AgentLiveness::Active,
            last_heartbeat: Some(Utc::now()),
            consecutive_failures: 0,
            sync_status: SyncStatus::Completed,
            files_to_sync: 0,
            files_synced: 0,
            sync_error: None,
            devices: vec![],
            schedule: vec![],
            current_task_id: None,
        }
    }

    #[test]
    fn eligible_when_active_and_idle() {
        assert!(base_agent().is_eligible_for_dispatch());
    }

    #[test]
    fn ineligible_when_holding_a_task() {
        let mut agent = base_agent();
        agent.current_task_id = Some(uuid::Uuid::new_v4());
        assert!(!agent.is_eligible_for_dispatch());
    }

    #[test]
    fn eligible_when_never_asked_to_sync_anything_yet() {
        let mut agent = base_agent();
        agent.sync_status = SyncStatus::Pending;
        assert!(agent.is_eligible_for_dispatch());
    }

    #[test]
    fn ineligible_while_a_sync_is_in_progress_or_failed() {
        let mut agent = base_agent();
        agent.sync_status = SyncStatus::InProgress;
        assert!(!agent.is_eligible_for_dispatch());

        agent.sync_status = SyncStatus::Failed;
        assert!(!agent.is_eligible_for_dispatch());
    }

    #[test]
    fn disconnected_without_recent_heartbeat() {
        let mut agent = base_agent();
        agent.last_heartbeat = Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert!(agent.is_disconnected(Utc::now(), 60));
    }

    #[test]
    fn empty_schedule_means_always_eligible() {
        assert!(base_agent().within_schedule(Utc::now()));
    }
}
