// [libs/infra/transport/src/outbox.rs]
/*!
 * Durable on-disk outbox for critical agent->coordinator messages. Every
 * message carrying cracked hashes, plus terminal task-status transitions,
 * passes through here before it reaches the wire, so a crash or
 * disconnect between "engine produced a crack" and "coordinator
 * acknowledged it" can never silently lose the crack.
 *
 * Each entry is one file under the outbox directory, named by its message
 * id, holding the bincode-encoded envelope plus a one-byte state suffix.
 * States:
 *   pending   - written, never sent.
 *   in_flight - claimed by a send attempt; reverts to pending if the
 *               attempt fails so the next drain retries it.
 *   acked     - coordinator confirmed receipt; file is deleted rather than
 *               kept around, since the ack itself is the durability proof
 *               once persisted upstream.
 *
 * At-least-once delivery here, paired with an idempotent receiver keyed on
 * message id, gives an effectively-exactly-once crack pipeline.
 */

use crate::envelope::{decode_envelope, encode_envelope};
use crate::errors::TransportError;
use prospector_domain_models::MessageEnvelope;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxEntryState {
    Pending,
    InFlight,
}

struct OutboxEntry {
    state: OutboxEntryState,
    path: PathBuf,
}

/// A file-backed queue. Safe to share across tasks via `Arc`; internal
/// state is a single mutex since outbox throughput is bottlenecked on disk
/// I/O and network sends, not in-memory bookkeeping.
pub struct DurableOutbox {
    directory: PathBuf,
    entries: Mutex<HashMap<Uuid, OutboxEntry>>,
}

impl DurableOutbox {
    /// Opens (creating if absent) the outbox directory and replays any
    /// files already on disk from a previous process, so a crash mid-drain
    /// resumes cleanly. Files are reloaded as `pending` regardless of
    /// their last known state, since an in-flight message from a prior
    /// process may or may not have reached the coordinator.
    pub fn open(directory: impl AsRef<Path>) -> Result<Self, TransportError> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory)?;

        let mut entries = HashMap::new();
        for entry in std::fs::read_dir(&directory)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("msg") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                entries.insert(id, OutboxEntry { state: OutboxEntryState::Pending, path });
            }
        }

        debug!(recovered = entries.len(), "outbox reopened from disk");
        Ok(Self { directory, entries: Mutex::new(entries) })
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.directory.join(format!("{id}.msg"))
    }

    /// Persists a message durably before it is ever attempted on the wire.
    pub fn enqueue(&self, envelope: &MessageEnvelope) -> Result<(), TransportError> {
        let path = self.path_for(envelope.id);
        let bytes = encode_envelope(envelope)?;
        std::fs::write(&path, bytes)?;

        let mut entries = self.entries.lock().unwrap();
        entries.insert(envelope.id, OutboxEntry { state: OutboxEntryState::Pending, path });
        Ok(())
    }

    /// Returns every pending message, in enqueue order by id insertion,
    /// and marks each `in_flight` so a concurrent drain call doesn't
    /// resend the same entry. Call `ack` or `release` on each returned id
    /// once the send attempt resolves.
    pub fn drain_pending(&self) -> Vec<MessageEnvelope> {
        let mut entries = self.entries.lock().unwrap();
        let mut drained = Vec::new();

        for entry in entries.values_mut() {
            if entry.state != OutboxEntryState::Pending {
                continue;
            }
            let bytes = match std::fs::read(&entry.path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(path = %entry.path.display(), %err, "outbox entry unreadable, skipping");
                    continue;
                }
            };
            match decode_envelope(&bytes) {
                Ok(envelope) => {
                    entry.state = OutboxEntryState::InFlight;
                    drained.push(envelope);
                }
                Err(err) => warn!(path = %entry.path.display(), %err, "outbox entry corrupt, skipping"),
            }
        }

        drained
    }

    /// Marks a message acknowledged by the coordinator and removes it from
    /// disk. Idempotent: acking an id that no longer exists is a no-op,
    /// since a duplicate ack for an already-removed entry is harmless.
    pub fn ack(&self, id: Uuid) -> Result<(), TransportError> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.remove(&id) {
            if entry.path.exists() {
                std::fs::remove_file(&entry.path)?;
            }
        }
        Ok(())
    }

    /// Reverts an in-flight message back to pending after a failed send
    /// attempt, so the next drain retries it.
    pub fn release(&self, id: Uuid) -> Result<(), TransportError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get_mut(&id).ok_or(TransportError::UnknownEntry(id))?;
        if entry.state != OutboxEntryState::InFlight {
            return Err(TransportError::NotPending(id));
        }
        entry.state = OutboxEntryState::Pending;
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.state == OutboxEntryState::Pending)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_domain_models::MessageKind;
    use tempfile::tempdir;

    fn heartbeat() -> MessageEnvelope {
        MessageEnvelope::new(MessageKind::Heartbeat)
    }

    #[test]
    fn enqueue_then_drain_returns_the_message() {
        let dir = tempdir().unwrap();
        let outbox = DurableOutbox::open(dir.path()).unwrap();
        let envelope = heartbeat();
        outbox.enqueue(&envelope).unwrap();

        let drained = outbox.drain_pending();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].id, envelope.id);
        assert_eq!(outbox.pending_count(), 0);
    }

    #[test]
    fn ack_removes_entry_and_file() {
        let dir = tempdir().unwrap();
        let outbox = DurableOutbox::open(dir.path()).unwrap();
        let envelope = heartbeat();
        outbox.enqueue(&envelope).unwrap();
        outbox.drain_pending();

        outbox.ack(envelope.id).unwrap();
        assert!(outbox.is_empty());
        assert!(!dir.path().join(format!("{}.msg", envelope.id)).exists());
    }

    #[test]
    fn ack_on_unknown_id_is_a_harmless_no_op() {
        let dir = tempdir().unwrap();
        let outbox = DurableOutbox::open(dir.path()).unwrap();
        outbox.ack(Uuid::new_v4()).unwrap();
    }

    #[test]
    fn release_reverts_to_pending_for_retry() {
        let dir = tempdir().unwrap();
        let outbox = DurableOutbox::open(dir.path()).unwrap();
        let envelope = heartbeat();
        outbox.enqueue(&envelope).unwrap();
        outbox.drain_pending();
        assert_eq!(outbox.pending_count(), 0);

        outbox.release(envelope.id).unwrap();
        assert_eq!(outbox.pending_count(), 1);

        let drained_again = outbox.drain_pending();
        assert_eq!(drained_again.len(), 1);
    }

    #[test]
    fn reopening_recovers_unacked_entries_from_disk() {
        let dir = tempdir().unwrap();
        let envelope = heartbeat();
        {
            let outbox = DurableOutbox::open(dir.path()).unwrap();
            outbox.enqueue(&envelope).unwrap();
            outbox.drain_pending(); // simulate a crash mid send, still on disk
        }

        let reopened = DurableOutbox::open(dir.path()).unwrap();
        let drained = reopened.drain_pending();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].id, envelope.id);
    }

    #[test]
    fn drain_does_not_return_an_already_in_flight_entry_twice() {
        let dir = tempdir().unwrap();
        let outbox = DurableOutbox::open(dir.path()).unwrap();
        outbox.enqueue(&heartbeat()).unwrap();

        let first = outbox.drain_pending();
        let second = outbox.drain_pending();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 0);
    }
}
