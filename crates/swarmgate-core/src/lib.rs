//! Core types and error definitions shared across the Swarmgate workspace.
//!
//! # Main types
//!
//! - [`SwarmgateError`] — Unified error enum for all subsystems.
//! - [`SwarmgateResult`] — Convenience alias for `Result<T, SwarmgateError>`.
//! - [`Message`] / [`Role`] — A single message within an agent conversation.
//! - [`ToolCall`] / [`ToolResult`] — LLM-initiated tool invocations.
//! - [`AgentRole`] — The fixed set of roles an agent may register under.
//! - [`EventSink`] — Observer interface for hub and swarm domain events.

/// Domain events and the observer interface that consumes them.
pub mod event;
/// Conversation message types.
pub mod message;
/// Agent role definitions.
pub mod role;
/// Tool call and tool result types.
pub mod tool;

pub use event::{Event, EventSink, HubEvent, LogSink, NullSink, SwarmEvent};
pub use message::{Message, Role};
pub use role::AgentRole;
pub use tool::{ToolCall, ToolResult};

/// Top-level error type for the Swarmgate workspace.
///
/// Each variant corresponds to a subsystem that can produce errors. Expected
/// outcomes (validation failure, capacity limits, rate limiting, consensus
/// non-decision) are modeled as structured values by the components that
/// produce them, not as variants here.
#[derive(Debug, thiserror::Error)]
pub enum SwarmgateError {
    /// An error from the hub connection or routing layer.
    #[error("Hub error: {0}")]
    Hub(String),

    /// An error raised at the worker-agent execution boundary.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error from the swarm orchestrator.
    #[error("Swarm error: {0}")]
    Swarm(String),

    /// A security-related error (auth, sanitization, rate limiting).
    #[error("Security error: {0}")]
    Security(String),

    /// A malformed or unrecognized wire frame.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`SwarmgateError`].
pub type SwarmgateResult<T> = Result<T, SwarmgateError>;
