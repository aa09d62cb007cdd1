use crate::completion::{CompletionBackend, TokenUsage};
use crate::tools::{AgentTool, HANDOFF_TOOL};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use swarmgate_core::{AgentRole, Message, ToolCall};
use tracing::{debug, warn};
use uuid::Uuid;

/// Legacy text marker some prompts still emit to request delegation.
/// Checked only when no structured tool call is present.
const LEGACY_HANDOFF_PREFIX: &str = "HANDOFF:";

/// Model parameters passed through to the completion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// Static configuration for a worker agent.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub name: String,
    pub role: AgentRole,
    pub instructions: String,
    pub capabilities: Vec<String>,
    pub model: ModelParams,
    /// Hard ceiling on one completion call; a hung backend fails the turn
    /// instead of stalling the task or the parallel barrier.
    pub turn_timeout: Duration,
}

impl WorkerConfig {
    pub fn new(name: impl Into<String>, role: AgentRole, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role,
            instructions: instructions.into(),
            capabilities: Vec::new(),
            model: ModelParams::default(),
            turn_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }
}

/// Runtime status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Error,
}

/// Cumulative execution statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WorkerStats {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub total_tokens: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug)]
struct RuntimeState {
    status: WorkerStatus,
    context: HashMap<String, serde_json::Value>,
    stats: WorkerStats,
}

/// What a turn produced, decided explicitly by the worker rather than
/// inferred downstream from result shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Final text for this turn; no further action requested.
    Content { text: String },
    /// Transfer conversation control to another agent.
    Handoff {
        agent: String,
        context: HashMap<String, serde_json::Value>,
    },
    /// One or more tool invocations to execute before the next turn.
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
    /// The turn failed; the error never propagates as a raised fault.
    Failed { message: String, timed_out: bool },
}

/// Structured result of one agent turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub agent: String,
    pub outcome: TurnOutcome,
    /// Merged context-variable map after this turn.
    pub context: HashMap<String, serde_json::Value>,
    pub usage: TokenUsage,
    pub elapsed_ms: u64,
}

impl TurnResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, TurnOutcome::Failed { .. })
    }
}

/// A configured role capable of producing one turn of a conversation
/// through the injected completion collaborator.
pub struct WorkerAgent {
    pub id: Uuid,
    config: WorkerConfig,
    tools: Vec<AgentTool>,
    backend: Arc<dyn CompletionBackend>,
    state: parking_lot::Mutex<RuntimeState>,
}

impl WorkerAgent {
    pub fn new(config: WorkerConfig, backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            tools: Vec::new(),
            backend,
            state: parking_lot::Mutex::new(RuntimeState {
                status: WorkerStatus::Idle,
                context: HashMap::new(),
                stats: WorkerStats::default(),
            }),
        }
    }

    pub fn with_tool(mut self, tool: AgentTool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn role(&self) -> AgentRole {
        self.config.role
    }

    pub fn capabilities(&self) -> &[String] {
        &self.config.capabilities
    }

    /// Consensus vote weight: declared capability count, minimum 1.
    pub fn weight(&self) -> usize {
        self.config.capabilities.len().max(1)
    }

    pub fn status(&self) -> WorkerStatus {
        self.state.lock().status
    }

    pub fn stats(&self) -> WorkerStats {
        self.state.lock().stats
    }

    pub fn find_tool(&self, name: &str) -> Option<&AgentTool> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Instructions plus a description of the available tools.
    fn system_prompt(&self) -> String {
        let mut prompt = self.config.instructions.clone();
        if !self.tools.is_empty() {
            prompt.push_str("\n\nAvailable tools:\n");
            for tool in &self.tools {
                prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
            }
        }
        prompt
    }

    /// Produce one turn from the given conversation and context variables.
    ///
    /// This boundary never raises: backend errors and timeouts come back as
    /// [`TurnOutcome::Failed`], and the worker's own statistics and status
    /// are updated either way.
    pub async fn execute(
        &self,
        conversation: &[Message],
        context: &HashMap<String, serde_json::Value>,
    ) -> TurnResult {
        let start = Instant::now();
        let merged_context = {
            let mut state = self.state.lock();
            state.status = WorkerStatus::Busy;
            state.context.extend(context.clone());
            state.context.clone()
        };

        let system_prompt = self.system_prompt();
        let completion = tokio::time::timeout(
            self.config.turn_timeout,
            self.backend.complete(&system_prompt, conversation),
        )
        .await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match completion {
            Ok(Ok(completion)) => {
                let outcome = self.classify(completion.content, completion.tool_calls);
                self.record_success(elapsed_ms, u64::from(completion.usage.total()));
                debug!(agent = %self.config.name, elapsed_ms, "turn complete");
                TurnResult {
                    agent: self.config.name.clone(),
                    outcome,
                    context: merged_context,
                    usage: completion.usage,
                    elapsed_ms,
                }
            }
            Ok(Err(e)) => {
                warn!(agent = %self.config.name, error = %e, "completion failed");
                self.record_failure();
                TurnResult {
                    agent: self.config.name.clone(),
                    outcome: TurnOutcome::Failed {
                        message: e.to_string(),
                        timed_out: false,
                    },
                    context: merged_context,
                    usage: TokenUsage::default(),
                    elapsed_ms,
                }
            }
            Err(_) => {
                warn!(
                    agent = %self.config.name,
                    timeout_secs = self.config.turn_timeout.as_secs(),
                    "completion timed out"
                );
                self.record_failure();
                TurnResult {
                    agent: self.config.name.clone(),
                    outcome: TurnOutcome::Failed {
                        message: format!(
                            "completion timed out after {}s",
                            self.config.turn_timeout.as_secs()
                        ),
                        timed_out: true,
                    },
                    context: merged_context,
                    usage: TokenUsage::default(),
                    elapsed_ms,
                }
            }
        }
    }

    /// Decide the tagged outcome for a completion. A structured `handoff`
    /// tool call wins; the legacy text marker is a fallback checked only
    /// when the model requested no tools at all.
    fn classify(&self, content: String, tool_calls: Vec<ToolCall>) -> TurnOutcome {
        if let Some(call) = tool_calls.iter().find(|c| c.name == HANDOFF_TOOL) {
            let agent = call
                .arguments
                .get("agent")
                .and_then(|a| a.as_str())
                .unwrap_or_default()
                .to_string();
            let context = call
                .arguments
                .get("context")
                .and_then(|c| c.as_object())
                .map(|m| m.clone().into_iter().collect())
                .unwrap_or_default();
            if agent.is_empty() {
                return TurnOutcome::Failed {
                    message: "handoff tool call missing 'agent' argument".to_string(),
                    timed_out: false,
                };
            }
            return TurnOutcome::Handoff { agent, context };
        }

        if !tool_calls.is_empty() {
            let text = content.trim();
            return TurnOutcome::ToolCalls {
                content: (!text.is_empty()).then(|| text.to_string()),
                calls: tool_calls,
            };
        }

        let trimmed = content.trim();
        if let Some(rest) = trimmed.strip_prefix(LEGACY_HANDOFF_PREFIX) {
            let agent = rest.trim().split_whitespace().next().unwrap_or_default();
            if !agent.is_empty() {
                return TurnOutcome::Handoff {
                    agent: agent.to_string(),
                    context: HashMap::new(),
                };
            }
        }

        TurnOutcome::Content {
            text: content,
        }
    }

    fn record_success(&self, elapsed_ms: u64, tokens: u64) {
        let mut state = self.state.lock();
        let stats = &mut state.stats;
        let completed = stats.tasks_completed as f64;
        stats.avg_latency_ms =
            (stats.avg_latency_ms * completed + elapsed_ms as f64) / (completed + 1.0);
        stats.tasks_completed += 1;
        stats.total_tokens += tokens;
        state.status = WorkerStatus::Idle;
    }

    fn record_failure(&self) {
        let mut state = self.state.lock();
        state.stats.tasks_failed += 1;
        state.status = WorkerStatus::Error;
    }
}

impl std::fmt::Debug for WorkerAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerAgent")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("role", &self.config.role)
            .finish_non_exhaustive()
    }
}
