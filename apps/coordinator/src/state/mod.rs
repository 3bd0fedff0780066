// [apps/coordinator/src/state/mod.rs]
/*!
 * =================================================================
 * APARATO: COORDINATOR APPLICATION STATE (ESTRATO L3)
 * RESPONSABILIDAD: MEMORIA COMPARTIDA DE CONEXIONES, REPOSITORIOS Y MODO
 * =================================================================
 */

mod agent_registry;

pub use agent_registry::AgentRegistry;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use prospector_core_dedup::ShardedDedupSet;
use prospector_domain_models::SchedulerSettings;
use prospector_infra_db::{
    AgentRepository, ChunkRepository, DbClient, HashRepository, JobRepository, MetricsRepository,
    SettingsRepository,
};
use tracing::error;

const MESSAGE_DEDUP_PARTITIONS: usize = 16;

/// Whether the coordinator is accepting new dispatch work. Flipped to
/// `Maintenance` by the boot-time schema/settings reconciliation check if it
/// fails, and read by the dispatcher and handshake handlers before doing
/// anything that assumes a healthy database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemMode {
    Operational,
    Maintenance(String),
}

#[derive(Clone)]
pub struct AppState {
    pub database_client: DbClient,
    pub job_repository: Arc<JobRepository>,
    pub chunk_repository: Arc<ChunkRepository>,
    pub agent_repository: Arc<AgentRepository>,
    pub hash_repository: Arc<HashRepository>,
    pub metrics_repository: Arc<MetricsRepository>,
    pub settings_repository: Arc<SettingsRepository>,
    pub agent_registry: Arc<AgentRegistry>,
    /// Deduplicates inbound message envelope ids so an at-least-once
    /// redelivery from an agent's durable outbox is a no-op the second time.
    pub message_dedup: Arc<ShardedDedupSet>,
    pub settings: Arc<RwLock<SchedulerSettings>>,
    pub current_system_mode: Arc<RwLock<SystemMode>>,
    /// Jobs flagged by the dispatcher's preemption policy, keyed by the job
    /// being interrupted, with the instant its running chunks should be
    /// signaled for cancellation. Purely in-memory: a coordinator restart
    /// simply re-evaluates priorities from scratch on its next tick.
    pub preemption_deadlines: Arc<RwLock<HashMap<Uuid, DateTime<Utc>>>>,
    /// Root directory file-sync downloads (wordlists, rules, binaries) are
    /// served from, keyed by `{category}/{name}`.
    pub files_root: Arc<PathBuf>,
    pub agent_bearer_token: Arc<String>,
    /// Name of the cracking-engine binary agents fetch from the `binaries`
    /// file-sync category before running a task.
    pub cracking_binary_name: Arc<String>,
}

impl AppState {
    pub fn new(
        database_client: DbClient,
        files_root: PathBuf,
        agent_bearer_token: String,
        cracking_binary_name: String,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            job_repository: Arc::new(JobRepository::new(database_client.clone())),
            chunk_repository: Arc::new(ChunkRepository::new(database_client.clone())),
            agent_repository: Arc::new(AgentRepository::new(database_client.clone())),
            hash_repository: Arc::new(HashRepository::new(database_client.clone())),
            metrics_repository: Arc::new(MetricsRepository::new(database_client.clone())),
            settings_repository: Arc::new(SettingsRepository::new(database_client.clone())),
            database_client,
            agent_registry: Arc::new(AgentRegistry::new()),
            message_dedup: Arc::new(ShardedDedupSet::new(MESSAGE_DEDUP_PARTITIONS)),
            settings: Arc::new(RwLock::new(settings)),
            current_system_mode: Arc::new(RwLock::new(SystemMode::Operational)),
            preemption_deadlines: Arc::new(RwLock::new(HashMap::new())),
            files_root: Arc::new(files_root),
            agent_bearer_token: Arc::new(agent_bearer_token),
            cracking_binary_name: Arc::new(cracking_binary_name),
        }
    }

    pub fn set_mode(&self, target: SystemMode) {
        match self.current_system_mode.write() {
            Ok(mut guard) => *guard = target,
            Err(poisoned) => {
                error!("system mode lock poisoned, recovering");
                *poisoned.into_inner() = target;
            }
        }
    }

    /// `Ok(())` while operational; `Err(reason)` while in maintenance, which
    /// dispatch-adjacent handlers use to reject work with a 503 rather than
    /// touching a database that failed its own integrity check.
    pub fn is_operational(&self) -> Result<(), String> {
        let guard = match self.current_system_mode.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match &*guard {
            SystemMode::Operational => Ok(()),
            SystemMode::Maintenance(reason) => Err(reason.clone()),
        }
    }

    pub fn current_settings(&self) -> SchedulerSettings {
        match self.settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace_settings(&self, settings: SchedulerSettings) {
        match self.settings.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }
}
