use crate::directory::AgentDirectory;
use crate::protocol::{Envelope, SenderInfo, ServerFrame};
use crate::registry::{Connection, SessionRegistry};
use crate::room::RoomStore;
use std::collections::HashMap;
use std::sync::Arc;
use swarmgate_core::{Event, EventSink, HubEvent};
use swarmgate_security::ContentGuard;
use tracing::{debug, warn};

/// Builds envelopes, applies content validation, records history, and
/// delivers to the right targets.
pub struct MessageRouter {
    registry: Arc<SessionRegistry>,
    rooms: Arc<RoomStore>,
    directory: Arc<AgentDirectory>,
    guard: Arc<dyn ContentGuard>,
    events: Arc<dyn EventSink>,
    default_room: String,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        rooms: Arc<RoomStore>,
        directory: Arc<AgentDirectory>,
        guard: Arc<dyn ContentGuard>,
        events: Arc<dyn EventSink>,
        default_room: String,
    ) -> Self {
        Self {
            registry,
            rooms,
            directory,
            guard,
            events,
            default_room,
        }
    }

    /// Route one `message` frame from an authenticated sender.
    ///
    /// Delivery resolution, in order: target agent (direct), room fan-out,
    /// global fan-out. The sender always receives exactly one reply: an
    /// error frame on validation failure, otherwise a delivery ack.
    pub async fn route(
        &self,
        sender: &Connection,
        room_id: Option<String>,
        content: &str,
        target_agent_id: Option<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) {
        let validation = self.guard.validate(content);
        if !validation.is_valid() {
            warn!(connection_id = %sender.id, "message rejected by content guard");
            sender.send(&ServerFrame::error(format!(
                "message rejected: {}",
                validation.violations().join("; ")
            )));
            return;
        }

        let clean = self.guard.sanitize(content);
        let sender_info = SenderInfo {
            user_id: sender.user_id(),
            agent_id: sender.agent_id(),
            role: sender.role(),
        };
        let envelope = Envelope::new(room_id.clone(), sender_info, clean, metadata);
        let ack = ServerFrame::MessageAck {
            message_id: envelope.id,
            timestamp: envelope.timestamp,
        };
        let history_room = room_id.as_deref().unwrap_or(&self.default_room);
        let delivery = ServerFrame::Message(envelope.clone()).to_json();

        if let Some(agent_id) = target_agent_id {
            // Direct delivery to the agent's owning connection; a miss is
            // reported to the sender but is not fatal.
            self.rooms.append_history(history_room, envelope.clone()).await;
            match self.directory.connection_of(&agent_id).await {
                Some(conn_id) => match self.registry.get(conn_id).await {
                    Some(target) => {
                        let _ = target
                            .tx
                            .send(crate::registry::Outbound::Frame(delivery));
                    }
                    None => {
                        sender.send(&ServerFrame::error(format!(
                            "agent '{agent_id}' has no live connection"
                        )));
                    }
                },
                None => {
                    sender.send(&ServerFrame::error(format!("agent '{agent_id}' not found")));
                }
            }
        } else if let Some(room) = &room_id {
            // Atomic append-and-deliver keeps per-room order.
            let delivered = self
                .rooms
                .publish(room, envelope.clone(), &delivery, sender.id)
                .await;
            debug!(room = %room, delivered, "room fan-out");
        } else {
            self.rooms.append_history(history_room, envelope.clone()).await;
            self.registry
                .broadcast(&ServerFrame::Message(envelope.clone()), Some(sender.id))
                .await;
        }

        sender.count_message();
        sender.send(&ack);

        self.events.emit(Event::Hub(HubEvent::MessageRouted {
            room: room_id,
            sender: envelope
                .sender
                .user_id
                .clone()
                .or(envelope.sender.agent_id.clone())
                .unwrap_or_default(),
            bytes: envelope.content.len(),
        }));
    }
}
