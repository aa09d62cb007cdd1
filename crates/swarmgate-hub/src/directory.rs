use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use swarmgate_core::AgentRole;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Lifecycle status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Ready,
    Busy,
    Error,
    Offline,
}

/// One hub-level agent registration.
///
/// `connection_id` is a weak back-reference to the owning connection; it is
/// never followed after the connection closes — close removes the entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredAgent {
    pub id: String,
    pub role: AgentRole,
    pub capabilities: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub status: AgentStatus,
    pub registered_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub connection_id: Uuid,
}

/// Maps external agent identity to the owning connection and declared role.
pub struct AgentDirectory {
    agents: RwLock<HashMap<String, RegisteredAgent>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Register an agent. Fails if the id is already taken.
    pub async fn register(
        &self,
        id: &str,
        role: AgentRole,
        capabilities: Vec<String>,
        metadata: HashMap<String, serde_json::Value>,
        connection_id: Uuid,
    ) -> Result<(), String> {
        let mut agents = self.agents.write().await;
        if agents.contains_key(id) {
            return Err(format!("agent id '{id}' is already registered"));
        }
        let now = Utc::now();
        agents.insert(
            id.to_string(),
            RegisteredAgent {
                id: id.to_string(),
                role,
                capabilities,
                metadata,
                status: AgentStatus::Ready,
                registered_at: now,
                last_activity: now,
                connection_id,
            },
        );
        tracing::info!(agent_id = %id, role = %role, "agent registered");
        Ok(())
    }

    /// Remove one agent by id.
    pub async fn remove(&self, id: &str) -> bool {
        self.agents.write().await.remove(id).is_some()
    }

    /// Remove every agent owned by a closing connection; returns their ids.
    pub async fn remove_by_connection(&self, connection_id: Uuid) -> Vec<String> {
        let mut agents = self.agents.write().await;
        let ids: Vec<String> = agents
            .values()
            .filter(|a| a.connection_id == connection_id)
            .map(|a| a.id.clone())
            .collect();
        for id in &ids {
            agents.remove(id);
        }
        ids
    }

    pub async fn get(&self, id: &str) -> Option<RegisteredAgent> {
        self.agents.read().await.get(id).cloned()
    }

    /// The live connection currently owning this agent id.
    pub async fn connection_of(&self, id: &str) -> Option<Uuid> {
        self.agents.read().await.get(id).map(|a| a.connection_id)
    }

    /// Update an agent's status, stamping last activity.
    pub async fn set_status(&self, id: &str, status: AgentStatus) -> bool {
        let mut agents = self.agents.write().await;
        match agents.get_mut(id) {
            Some(agent) => {
                agent.status = status;
                agent.last_activity = Utc::now();
                true
            }
            None => false,
        }
    }

    pub async fn status_of(&self, id: &str) -> Option<AgentStatus> {
        self.agents.read().await.get(id).map(|a| a.status)
    }

    pub async fn count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Agent counts per role, for the status and metrics surfaces.
    pub async fn role_breakdown(&self) -> HashMap<String, usize> {
        let agents = self.agents.read().await;
        let mut breakdown = HashMap::new();
        for agent in agents.values() {
            *breakdown.entry(agent.role.to_string()).or_insert(0) += 1;
        }
        breakdown
    }
}

impl Default for AgentDirectory {
    fn default() -> Self {
        Self::new()
    }
}
