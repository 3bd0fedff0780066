// [libs/infra/agent-client/src/errors.rs]
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("network request to the coordinator failed: {0}")]
    NetworkFault(#[from] reqwest::Error),

    #[error("disk access failed while syncing a file: {0}")]
    IoFault(#[from] std::io::Error),

    #[error("coordinator rejected the request with status {0}")]
    ServerRejection(String),

    #[error("downloaded content digest {actual} did not match expected {expected}")]
    DigestMismatch { expected: String, actual: String },

    #[error("file sync for {0} exhausted all retries")]
    SyncExhausted(String),

    #[error("bearer token rejected by coordinator")]
    Unauthorized,
}
