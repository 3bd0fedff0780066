// [libs/domain/planner/src/errors.rs]
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlannerError {
    #[error("attack config is missing a mask for a mask/hybrid attack mode")]
    MissingMask,

    #[error("attack config needs at least {0} wordlist(s) for this attack mode")]
    MissingWordlists(usize),

    #[error(transparent)]
    Keyspace(#[from] prospector_core_keyspace::KeyspaceError),
}
