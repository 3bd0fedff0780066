// [libs/infra/db/src/repositories/agent_repository.rs]
/*!
 * Persistence for agents: registration, heartbeats, sync state and the
 * device/schedule roster the planner and dispatcher consult.
 */

use crate::errors::DbError;
use crate::sql_enum::{from_sql_string, to_sql_string};
use crate::DbClient;
use libsql::{params, Row};
use prospector_domain_models::agent::{Agent, AgentLiveness, Device, ScheduleWindow, SyncStatus};
use tracing::{info, instrument};
use uuid::Uuid;

pub struct AgentRepository {
    client: DbClient,
}

impl AgentRepository {
    pub fn new(client: DbClient) -> Self {
        Self { client }
    }

    #[instrument(skip(self))]
    pub async fn register(&self, owner: &str, claim_code_limit: u32) -> Result<i64, DbError> {
        let connection = self.client.connection()?;
        connection
            .execute(
                "INSERT INTO agents (owner, claim_code_limit, enabled, status, sync_status)
                 VALUES (?1, ?2, 1, 'inactive', 'pending')",
                params![owner, claim_code_limit as i64],
            )
            .await?;
        let id = connection.last_insert_rowid();
        info!(agent_id = id, owner, "agent registered");
        Ok(id)
    }

    pub async fn fetch(&self, id: i64) -> Result<Agent, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection.query("SELECT * FROM agents WHERE id = ?1", params![id]).await?;
        match rows.next().await? {
            Some(row) => map_row_to_agent(&row),
            None => Err(DbError::AgentNotFound(id)),
        }
    }

    /// Agents with no in-flight task that aren't mid-transfer or stuck on a
    /// failed one. `pending` and `completed` both pass: the agent/coordinator
    /// wire protocol only reports `sync_status` once, at connect time, and
    /// real per-task file sync happens after assignment, so `pending` simply
    /// means "never asked to sync anything yet" rather than "behind".
    /// `Agent::is_eligible_for_dispatch` re-checks this same predicate in the
    /// dispatcher so the gate holds even for callers that bypass this query.
    pub async fn list_eligible_for_dispatch(&self) -> Result<Vec<Agent>, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection
            .query(
                "SELECT * FROM agents
                 WHERE enabled = 1 AND status = 'active' AND current_task_id IS NULL
                   AND sync_status IN ('pending', 'completed')",
                (),
            )
            .await?;
        let mut agents = Vec::new();
        while let Some(row) = rows.next().await? {
            agents.push(map_row_to_agent(&row)?);
        }
        Ok(agents)
    }

    #[instrument(skip(self))]
    pub async fn record_heartbeat(&self, id: i64) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE agents SET last_heartbeat = CURRENT_TIMESTAMP, status = 'active', updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1",
                params![id],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::AgentNotFound(id));
        }
        Ok(())
    }

    pub async fn mark_inactive(&self, id: i64) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        connection
            .execute("UPDATE agents SET status = 'inactive', updated_at = CURRENT_TIMESTAMP WHERE id = ?1", params![id])
            .await?;
        Ok(())
    }

    /// Assigns a task to an agent; fails if the agent is already holding
    /// one, mirroring the single-task-at-a-time invariant the chunk claim
    /// enforces on the other side of the relationship.
    #[instrument(skip(self))]
    pub async fn assign_task(&self, agent_id: i64, task_id: Uuid) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE agents SET current_task_id = ?2, status = 'busy', updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1 AND current_task_id IS NULL",
                params![agent_id, task_id.to_string()],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::ClaimConflict(task_id));
        }
        Ok(())
    }

    pub async fn release_task(&self, agent_id: i64) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        connection
            .execute(
                "UPDATE agents SET current_task_id = NULL, status = 'active', updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1",
                params![agent_id],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn update_sync_progress(
        &self,
        agent_id: i64,
        sync_status: SyncStatus,
        files_to_sync: u32,
        files_synced: u32,
        sync_error: Option<&str>,
    ) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let affected = connection
            .execute(
                "UPDATE agents
                 SET sync_status = ?2, files_to_sync = ?3, files_synced = ?4, sync_error = ?5, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1",
                params![agent_id, to_sql_string(&sync_status), files_to_sync as i64, files_synced as i64, sync_error],
            )
            .await?;
        if affected == 0 {
            return Err(DbError::AgentNotFound(agent_id));
        }
        Ok(())
    }

    pub async fn update_devices(&self, agent_id: i64, devices: &[Device]) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let devices_json = serde_json::to_string(devices).map_err(|e| DbError::MappingError(e.to_string()))?;
        connection
            .execute(
                "UPDATE agents SET devices_json = ?2, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
                params![agent_id, devices_json],
            )
            .await?;
        Ok(())
    }

    pub async fn update_schedule(&self, agent_id: i64, schedule: &[ScheduleWindow]) -> Result<(), DbError> {
        let connection = self.client.connection()?;
        let schedule_json = serde_json::to_string(schedule).map_err(|e| DbError::MappingError(e.to_string()))?;
        connection
            .execute(
                "UPDATE agents SET schedule_json = ?2, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
                params![agent_id, schedule_json],
            )
            .await?;
        Ok(())
    }

    /// Agents whose last heartbeat is older than `heartbeat_timeout_secs`,
    /// used by the reaper to decide who has disconnected outright (as
    /// opposed to a chunk's own reconnect grace period).
    pub async fn list_stale(&self, heartbeat_timeout_secs: i64) -> Result<Vec<Agent>, DbError> {
        let connection = self.client.connection()?;
        let mut rows = connection
            .query(
                "SELECT * FROM agents
                 WHERE status = 'active'
                 AND (last_heartbeat IS NULL OR datetime(last_heartbeat, '+' || ?1 || ' seconds') < CURRENT_TIMESTAMP)",
                params![heartbeat_timeout_secs],
            )
            .await?;
        let mut agents = Vec::new();
        while let Some(row) = rows.next().await? {
            agents.push(map_row_to_agent(&row)?);
        }
        Ok(agents)
    }
}

fn map_row_to_agent(row: &Row) -> Result<Agent, DbError> {
    let id: i64 = row.get(0)?;
    let owner: String = row.get(1)?;
    let claim_code_limit: i64 = row.get(2)?;
    let enabled: bool = row.get(3)?;
    let status: String = row.get(4)?;
    let last_heartbeat: Option<String> = row.get(5)?;
    let consecutive_failures: i64 = row.get(6)?;
    let sync_status: String = row.get(7)?;
    let files_to_sync: i64 = row.get(8)?;
    let files_synced: i64 = row.get(9)?;
    let sync_error: Option<String> = row.get(10)?;
    let devices_json: String = row.get(11)?;
    let schedule_json: String = row.get(12)?;
    let current_task_id: Option<String> = row.get(13)?;

    Ok(Agent {
        id,
        owner,
        claim_code_limit: claim_code_limit as u32,
        enabled,
        status: from_sql_string::<AgentLiveness>(&status)?,
        last_heartbeat: last_heartbeat.map(|raw| crate::parse_timestamp(&raw)).transpose()?,
        consecutive_failures: consecutive_failures as u32,
        sync_status: from_sql_string::<SyncStatus>(&sync_status)?,
        files_to_sync: files_to_sync as u32,
        files_synced: files_synced as u32,
        sync_error,
        devices: serde_json::from_str(&devices_json).map_err(|e| DbError::MappingError(e.to_string()))?,
        schedule: serde_json::from_str(&schedule_json).map_err(|e| DbError::MappingError(e.to_string()))?,
        current_task_id: current_task_id
            .map(|raw| Uuid::parse_str(&raw).map_err(|e| DbError::MappingError(e.to_string())))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo_over_memory() -> AgentRepository {
        let client = DbClient::connect(":memory:", None).await.unwrap();
        AgentRepository::new(client)
    }

    #[tokio::test]
    async fn registered_agent_starts_inactive_and_idle() {
        let repo = repo_over_memory().await;
        let id = repo.register("lab-rig-1", 1).await.unwrap();

        let agent = repo.fetch(id).await.unwrap();
        assert_eq!(agent.status, AgentLiveness::Inactive);
        assert!(!agent.holds_a_task());
    }

    #[tokio::test]
    async fn heartbeat_flips_an_agent_active() {
        let repo = repo_over_memory().await;
        let id = repo.register("lab-rig-1", 1).await.unwrap();
        repo.record_heartbeat(id).await.unwrap();

        let agent = repo.fetch(id).await.unwrap();
        assert_eq!(agent.status, AgentLiveness::Active);
        assert!(agent.last_heartbeat.is_some());
    }

    #[tokio::test]
    async fn assigning_a_task_twice_without_release_conflicts() {
        let repo = repo_over_memory().await;
        let id = repo.register("lab-rig-1", 1).await.unwrap();

        repo.assign_task(id, Uuid::new_v4()).await.unwrap();
        let second = repo.assign_task(id, Uuid::new_v4()).await;
        assert!(matches!(second, Err(DbError::ClaimConflict(_))));
    }
}
