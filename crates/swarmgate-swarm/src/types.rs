use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use swarmgate_agent::TurnResult;
use swarmgate_core::Message;
use uuid::Uuid;

/// Logical connectivity pattern among swarm agents. Informs which agent
/// acts as leader; it does not gate hub message delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    Hierarchical,
    Mesh,
    Ring,
    Star,
}

/// Algorithm used to reconcile parallel agent outputs into one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusType {
    Majority,
    Weighted,
    Byzantine,
    Leader,
}

/// Terminal and non-terminal states of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed { reason: String },
    MaxTurnsExceeded,
}

/// One record per executed turn: acting agent, result, timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub agent: String,
    pub result: TurnResult,
    pub timestamp: DateTime<Utc>,
}

/// Full record of a terminated task, returned to the caller before the
/// task is removed from the active set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: Uuid,
    pub status: TaskStatus,
    pub turns: u32,
    pub duration_ms: u64,
    pub final_agent: Option<String>,
    pub history: Vec<TurnRecord>,
    pub messages: Vec<Message>,
    pub context: HashMap<String, serde_json::Value>,
    /// Final produced text when the task completed.
    pub output: Option<String>,
}

/// Swarm-level configuration.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    pub topology: Topology,
    pub consensus: ConsensusType,
    /// Maximum number of agents in the swarm.
    pub capacity: usize,
    /// Default turn bound for `run` when the caller gives none.
    pub default_max_turns: u32,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            topology: Topology::Mesh,
            consensus: ConsensusType::Majority,
            capacity: 10,
            default_max_turns: 10,
        }
    }
}

impl SwarmConfig {
    pub fn new(topology: Topology, consensus: ConsensusType) -> Self {
        Self {
            topology,
            consensus,
            ..Self::default()
        }
    }

    /// Validate configuration values. Returns a list of issues found.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.capacity == 0 {
            issues.push("capacity must be at least 1".to_string());
        }
        if self.default_max_turns == 0 {
            issues.push("default_max_turns must be at least 1".to_string());
        }
        issues
    }
}
