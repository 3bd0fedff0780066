// [libs/core/keyspace/src/lib.rs]
/*!
 * =================================================================
 * APARATO: KEYSPACE ARITHMETIC KERNEL (ESTRATO L1)
 * RESPONSABILIDAD: COMBINATORIA DE MÁSCARAS Y DIMENSIONAMIENTO DE CHUNKS
 *
 * Plain numeric primitives for the job planner: mask combinatorics (what
 * the original teacher workspace did with U256 elliptic-curve scalars,
 * this crate does with u64/u128 keyspace counts) and chunk-window sizing.
 * No async, no I/O, no knowledge of agents or persistence — a pure
 * arithmetic kernel the planner and aggregator both depend on.
 * =================================================================
 */

pub mod chunking;
pub mod errors;
pub mod mask;

pub use chunking::{compute_chunk_windows, recompute_pending_tail, ChunkWindow};
pub use errors::KeyspaceError;
pub use mask::mask_keyspace;
