use crate::role::AgentRole;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain events emitted by the hub (registration, routing) for metering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HubEvent {
    /// An agent completed registration on a live connection.
    AgentRegistered { agent_id: String, role: AgentRole },
    /// An agent was removed (explicit deregistration or connection close).
    AgentDeregistered { agent_id: String },
    /// A message envelope was accepted and routed.
    MessageRouted {
        room: Option<String>,
        sender: String,
        bytes: usize,
    },
}

/// Domain events emitted by the swarm orchestrator on task termination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SwarmEvent {
    /// A task reached the Completed state.
    TaskCompleted {
        task_id: Uuid,
        turns: u32,
        duration_ms: u64,
    },
    /// A task terminated in Failed or MaxTurnsExceeded.
    TaskFailed {
        task_id: Uuid,
        turns: u32,
        duration_ms: u64,
        reason: String,
    },
}

/// Union of all domain events delivered to an [`EventSink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Event {
    Hub(HubEvent),
    Swarm(SwarmEvent),
}

/// Observer interface for domain events.
///
/// Emission is fire-and-forget: implementations must not block the caller.
/// Sinks that perform I/O (metering writes, audit persistence) are expected
/// to enqueue internally and flush on their own schedule.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Must return promptly.
    fn emit(&self, event: Event);
}

/// Sink that discards every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Sink that logs events through `tracing` at debug level.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        match &event {
            Event::Hub(e) => tracing::debug!(event = ?e, "hub event"),
            Event::Swarm(e) => tracing::debug!(event = ?e, "swarm event"),
        }
    }
}
