// [libs/infra/transport/src/lib.rs]
/*!
 * Wire codec and durable outbox shared by the coordinator's websocket
 * handler and the agent's outbound message path.
 */

pub mod envelope;
pub mod errors;
pub mod outbox;

pub use envelope::{decode_envelope, encode_envelope, MAX_WIRE_PAYLOAD_BYTES};
pub use errors::TransportError;
pub use outbox::{DurableOutbox, OutboxEntryState};
