// [libs/infra/transport/src/errors.rs]
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("encoded message exceeds the {0} byte wire limit")]
    PayloadTooLarge(usize),

    #[error("bincode encode failure: {0}")]
    Encode(#[from] bincode::Error),

    #[error("outbox io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("outbox entry {0} was not found")]
    UnknownEntry(uuid::Uuid),

    #[error("outbox entry {0} is not pending and cannot be claimed")]
    NotPending(uuid::Uuid),
}
