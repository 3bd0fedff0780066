// [libs/domain/models/src/lib.rs]
/*!
 * =================================================================
 * APARATO: DOMAIN MODELS ROOT (ESTRATO L2)
 * RESPONSABILIDAD: TIPOS COMPARTIDOS ENTRE COORDINATOR Y AGENT
 * =================================================================
 */

pub mod agent;
pub mod chunk;
pub mod hash;
pub mod job;
pub mod message;
pub mod settings;

pub use agent::{Agent, AgentLiveness, Device, ScheduleWindow, SyncStatus};
pub use chunk::{Chunk, ChunkStatus, DetailedStatus};
pub use hash::{Hash, Hashlist};
pub use job::{AttackConfig, AttackMode, Job, JobStatus, KeyspaceAccounting};
pub use message::{
    AgentReportedStatus, AgentStatusPayload, BenchmarkRequestPayload, BenchmarkResultPayload,
    CrackedBatchPayload, CrackedEntry, DeviceMetrics, FileSyncRequestPayload, MessageEnvelope,
    MessageKind, TaskAssignmentPayload, TaskProgressPayload,
};
pub use settings::SchedulerSettings;
