// [libs/domain/planner/src/lib.rs]
/*!
 * Deterministic job-to-chunk planner: turns an attack configuration into a
 * sequence of chunks, either by splitting the wordlist keyspace or, for
 * huge rule multipliers over a small base, by slicing the rule file
 * instead.
 */

pub mod errors;
pub mod plan;
pub mod rule_split;

pub use errors::PlannerError;
pub use plan::{plan_job, ChunkPlan, PlannedChunk, PlannerInput};
pub use rule_split::{rule_chunk_path, split_rule_indices, RuleSlice};
