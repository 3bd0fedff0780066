// [apps/agent/src/errors.rs]
use prospector_infra_agent_client::ClientError;
use prospector_infra_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("a cracker process (pid {0}) is already running on this agent")]
    CrackerAlreadyRunning(u32),

    #[error("failed to spawn the cracking engine: {0}")]
    SpawnFailed(String),

    #[error("network or protocol fault talking to the coordinator: {0}")]
    Client(#[from] ClientError),

    #[error("durable outbox fault: {0}")]
    Transport(#[from] TransportError),

    #[error("disk access failed: {0}")]
    Io(#[from] std::io::Error),
}
