//! The Swarmgate agent hub: a single-process WebSocket message broker.
//!
//! The hub authenticates peers against a shared secret, tracks presence,
//! routes messages between operators and registered agents, and maintains
//! bounded per-room history. One [`Hub`] instance owns all session and room
//! state in memory.
//!
//! # Main types
//!
//! - [`Hub`] — Façade composing the registry, rooms, directory, and router.
//! - [`HubConfig`] — Tunables (shared secret, caps, heartbeat, rate limit).
//! - [`HubServer`] — Axum application exposing `/ws`, `/health`, `/metrics`.
//! - [`protocol`] — The JSON wire frames exchanged with clients.

/// Hub configuration.
pub mod config;
/// Agent identity directory.
pub mod directory;
/// The hub façade and frame dispatch.
pub mod hub;
/// Wire protocol frames and envelopes.
pub mod protocol;
/// Connection registry.
pub mod registry;
/// Room membership and bounded history.
pub mod room;
/// Message routing.
pub mod router;
/// Axum WebSocket server.
pub mod server;

pub use config::HubConfig;
pub use directory::{AgentDirectory, AgentStatus, RegisteredAgent};
pub use hub::{Hub, HubStatus};
pub use protocol::{ClientFrame, Envelope, SenderInfo, ServerFrame};
pub use registry::{Connection, Outbound, SessionRegistry};
pub use server::HubServer;
