//! Swarm orchestration: drives one or more worker agents through
//! multi-turn conversations with delegation (handoff) and reconciles
//! parallel agent outputs through four consensus protocols.
//!
//! # Main types
//!
//! - [`Swarm`] — Owns a set of workers, a topology, and active tasks.
//! - [`consensus`] — Pure functions over a result set (majority, weighted,
//!   byzantine quorum, leader).
//! - [`TaskReport`] — The full record returned when a task terminates.

/// Consensus protocols.
pub mod consensus;
/// The swarm orchestrator.
pub mod swarm;
/// Shared orchestration types (task, topology, reports).
pub mod types;

pub use consensus::{decide, Consensus, ParallelResult};
pub use swarm::{ParallelOutcome, Swarm};
pub use types::{ConsensusType, SwarmConfig, TaskReport, TaskStatus, Topology, TurnRecord};
