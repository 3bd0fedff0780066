// [libs/infra/transport/src/envelope.rs]
/*!
 * Binary wire codec for the agent's durable outbox. The websocket channel
 * itself speaks JSON (`MessageEnvelope` derives `Serialize`/`Deserialize`
 * directly); bincode is used only for the on-disk outbox log, where a
 * compact fixed-overhead encoding keeps the append log small.
 *
 * Every encode/decode passes through a hard size ceiling so a corrupted or
 * hostile length prefix can never trigger an unbounded allocation.
 */

use crate::errors::TransportError;
use prospector_domain_models::MessageEnvelope;

/// Messages larger than this are rejected outright rather than encoded or
/// decoded. Generous enough for the largest expected `cracked_batch`
/// (tens of thousands of short crack lines) while bounding worst-case
/// memory use from an untrusted or corrupted frame.
pub const MAX_WIRE_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn encode_envelope(envelope: &MessageEnvelope) -> Result<Vec<u8>, TransportError> {
    let bytes = bincode::serialize(envelope)?;
    if bytes.len() > MAX_WIRE_PAYLOAD_BYTES {
        return Err(TransportError::PayloadTooLarge(MAX_WIRE_PAYLOAD_BYTES));
    }
    Ok(bytes)
}

pub fn decode_envelope(bytes: &[u8]) -> Result<MessageEnvelope, TransportError> {
    if bytes.len() > MAX_WIRE_PAYLOAD_BYTES {
        return Err(TransportError::PayloadTooLarge(MAX_WIRE_PAYLOAD_BYTES));
    }
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_domain_models::MessageKind;

    #[test]
    fn round_trips_a_heartbeat() {
        let envelope = MessageEnvelope::new(MessageKind::Heartbeat);
        let bytes = encode_envelope(&envelope).unwrap();
        let decoded = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded.id, envelope.id);
    }

    #[test]
    fn rejects_oversized_frame() {
        let oversized = vec![0u8; MAX_WIRE_PAYLOAD_BYTES + 1];
        assert!(matches!(
            decode_envelope(&oversized),
            Err(TransportError::PayloadTooLarge(_))
        ));
    }
}
