//! Worker agents: configured roles that produce one conversation turn at a
//! time through an injected completion backend.
//!
//! # Main types
//!
//! - [`WorkerAgent`] — A configured role (instructions, tools, model params).
//! - [`CompletionBackend`] — The opaque LLM collaborator seam.
//! - [`TurnResult`] / [`TurnOutcome`] — Tagged per-turn result: content,
//!   handoff, tool calls, or a structured failure. Nothing throws past the
//!   agent-execution boundary.

/// The completion-backend seam and its result types.
pub mod completion;
/// Agent tools and tool effects.
pub mod tools;
/// The worker agent itself.
pub mod worker;

pub use completion::{Completion, CompletionBackend, TokenUsage};
pub use tools::{AgentTool, ToolEffect, ToolHandler, HANDOFF_TOOL};
pub use worker::{
    ModelParams, TurnOutcome, TurnResult, WorkerAgent, WorkerConfig, WorkerStats, WorkerStatus,
};
