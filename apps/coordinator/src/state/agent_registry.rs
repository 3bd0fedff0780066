// [apps/coordinator/src/state/agent_registry.rs]
//! Tracks which agents currently hold an open WebSocket connection, so the
//! dispatcher and cancellation paths can push a message to a specific agent
//! without going through the database.

use std::collections::HashMap;
use std::sync::RwLock;

use axum::extract::ws::Message;
use prospector_domain_models::message::MessageEnvelope;
use tokio::sync::mpsc::UnboundedSender;
use tracing::error;

pub struct AgentRegistry {
    connections: RwLock<HashMap<i64, UnboundedSender<Message>>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self { connections: RwLock::new(HashMap::new()) }
    }

    pub fn register(&self, agent_id: i64, sender: UnboundedSender<Message>) {
        match self.connections.write() {
            Ok(mut guard) => {
                guard.insert(agent_id, sender);
            }
            Err(poisoned) => {
                error!(agent_id, "agent registry lock poisoned on register, recovering");
                poisoned.into_inner().insert(agent_id, sender);
            }
        }
    }

    pub fn unregister(&self, agent_id: i64) {
        match self.connections.write() {
            Ok(mut guard) => {
                guard.remove(&agent_id);
            }
            Err(poisoned) => {
                error!(agent_id, "agent registry lock poisoned on unregister, recovering");
                poisoned.into_inner().remove(&agent_id);
            }
        }
    }

    pub fn is_connected(&self, agent_id: i64) -> bool {
        match self.connections.read() {
            Ok(guard) => guard.contains_key(&agent_id),
            Err(poisoned) => poisoned.into_inner().contains_key(&agent_id),
        }
    }

    /// Sends an envelope to an agent's live socket, if one is open. Returns
    /// `false` if the agent is not currently connected or the channel is
    /// already closed (the dispatcher falls back to leaving the chunk
    /// assigned and lets the reconnect-grace reaper reclaim it).
    pub fn send_to(&self, agent_id: i64, envelope: &MessageEnvelope) -> bool {
        let sender = match self.connections.read() {
            Ok(guard) => guard.get(&agent_id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&agent_id).cloned(),
        };
        let Some(sender) = sender else { return false };

        let payload = match serde_json::to_string(envelope) {
            Ok(payload) => payload,
            Err(e) => {
                error!(agent_id, error = %e, "failed to serialize outbound envelope");
                return false;
            }
        };
        sender.send(Message::Text(payload)).is_ok()
    }

    pub fn connected_count(&self) -> usize {
        match self.connections.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_domain_models::message::{MessageEnvelope, MessageKind};

    #[test]
    fn send_to_unregistered_agent_returns_false() {
        let registry = AgentRegistry::new();
        let envelope = MessageEnvelope::new(MessageKind::Heartbeat);
        assert!(!registry.send_to(42, &envelope));
    }

    #[test]
    fn registered_agent_receives_the_frame() {
        let registry = AgentRegistry::new();
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
        registry.register(1, sender);
        assert!(registry.is_connected(1));

        let envelope = MessageEnvelope::new(MessageKind::Heartbeat);
        assert!(registry.send_to(1, &envelope));
        assert!(receiver.try_recv().is_ok());

        registry.unregister(1);
        assert!(!registry.is_connected(1));
    }
}
