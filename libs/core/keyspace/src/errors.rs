// [libs/core/keyspace/src/errors.rs]
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyspaceError {
    #[error("mask syntax error at byte offset {0}: unrecognized charset token")]
    InvalidMaskToken(usize),

    #[error("mask references custom charset ?{0} with no definition supplied")]
    UndefinedCustomCharset(char),

    #[error("keyspace arithmetic overflowed u128 (mask or wordlist product too large)")]
    Overflow,

    #[error("benchmark rate must be > 0 to size chunks")]
    ZeroBenchmarkRate,

    #[error("total keyspace is zero, nothing to schedule")]
    EmptyKeyspace,
}
