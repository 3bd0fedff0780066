// [libs/infra/db/src/errors.rs]
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database connection failed: {0}")]
    ConnectionError(String),

    #[error("database configuration is missing or invalid: {0}")]
    ConfigurationError(String),

    #[error("query rejected by the database engine: {0}")]
    QueryError(#[from] libsql::Error),

    #[error("row mapping failed: {0}")]
    MappingError(String),

    #[error("job {0} was not found")]
    JobNotFound(uuid::Uuid),

    #[error("chunk {0} was not found")]
    ChunkNotFound(uuid::Uuid),

    #[error("agent {0} was not found")]
    AgentNotFound(i64),

    #[error("chunk {0} could not be claimed: it is not in a claimable state or is owned by another agent")]
    ClaimConflict(uuid::Uuid),

    #[error("requested state transition is not legal from the chunk's current state")]
    InvalidState,

    #[error("database transaction could not be opened or committed")]
    TransactionError,
}
