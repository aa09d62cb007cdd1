use crate::consensus::{self, Consensus, ParallelResult};
use crate::types::{SwarmConfig, TaskReport, TaskStatus, Topology, TurnRecord};
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use swarmgate_agent::{ToolEffect, TurnOutcome, WorkerAgent};
use swarmgate_core::{
    Event, EventSink, Message, NullSink, SwarmEvent, SwarmgateError, SwarmgateResult, ToolResult,
};
use swarmgate_hub::{AgentStatus, Hub};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of one `run_parallel` call: the per-agent result set collected at
/// the fan-in barrier plus the consensus computed over it.
#[derive(Debug, Clone)]
pub struct ParallelOutcome {
    pub results: Vec<ParallelResult>,
    pub consensus: Consensus,
}

/// Owns a capacity-bounded set of worker agents and drives sequential
/// (turn-by-turn with handoff) or parallel (fan-out plus consensus) task
/// execution.
///
/// Sequential task state machine:
/// `Running(turn=0..max_turns) → Completed | Failed | MaxTurnsExceeded`.
pub struct Swarm {
    pub id: Uuid,
    config: SwarmConfig,
    agents: RwLock<HashMap<String, Arc<WorkerAgent>>>,
    queen: RwLock<Option<String>>,
    /// Cancellation token per in-flight task.
    active: RwLock<HashMap<Uuid, CancellationToken>>,
    hub: Option<Arc<Hub>>,
    events: Arc<dyn EventSink>,
}

impl Swarm {
    pub fn new(config: SwarmConfig) -> SwarmgateResult<Self> {
        let issues = config.validate();
        if !issues.is_empty() {
            return Err(SwarmgateError::Swarm(issues.join("; ")));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            config,
            agents: RwLock::new(HashMap::new()),
            queen: RwLock::new(None),
            active: RwLock::new(HashMap::new()),
            hub: None,
            events: Arc::new(NullSink),
        })
    }

    /// Attach a hub so agent status transitions are broadcast to connected
    /// peers as tasks execute.
    pub fn with_hub(mut self, hub: Arc<Hub>) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Add an agent, enforcing the swarm capacity bound and name uniqueness.
    pub async fn add_agent(&self, agent: WorkerAgent) -> SwarmgateResult<()> {
        let mut agents = self.agents.write().await;
        if agents.len() >= self.config.capacity {
            return Err(SwarmgateError::Swarm(format!(
                "swarm at capacity ({})",
                self.config.capacity
            )));
        }
        let name = agent.name().to_string();
        if agents.contains_key(&name) {
            return Err(SwarmgateError::Swarm(format!(
                "agent '{name}' already in swarm"
            )));
        }
        debug!(agent = %name, role = %agent.role(), "agent added to swarm");
        agents.insert(name, Arc::new(agent));
        Ok(())
    }

    pub async fn agent(&self, name: &str) -> Option<Arc<WorkerAgent>> {
        self.agents.read().await.get(name).cloned()
    }

    pub async fn agent_count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Designate the leader agent. Required before running tasks on a
    /// hierarchical swarm and authoritative under leader consensus.
    pub async fn set_queen(&self, name: &str) -> SwarmgateResult<()> {
        if !self.agents.read().await.contains_key(name) {
            return Err(SwarmgateError::Swarm(format!(
                "cannot designate unknown agent '{name}' as queen"
            )));
        }
        *self.queen.write().await = Some(name.to_string());
        Ok(())
    }

    pub async fn queen(&self) -> Option<String> {
        self.queen.read().await.clone()
    }

    /// Ids of tasks currently executing.
    pub async fn active_tasks(&self) -> Vec<Uuid> {
        self.active.read().await.keys().copied().collect()
    }

    /// Request cancellation of an in-flight task. Returns false when the
    /// task is unknown or already terminated.
    pub async fn cancel(&self, task_id: Uuid) -> bool {
        match self.active.read().await.get(&task_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn check_queen_requirement(&self) -> SwarmgateResult<()> {
        if self.config.topology == Topology::Hierarchical && self.queen.read().await.is_none() {
            return Err(SwarmgateError::Swarm(
                "hierarchical topology requires a designated queen".to_string(),
            ));
        }
        Ok(())
    }

    async fn mark(&self, agent: &str, status: AgentStatus) {
        if let Some(hub) = &self.hub {
            hub.set_agent_status(agent, status).await;
        }
    }

    /// Drive a task turn by turn from `starting_agent` until it completes,
    /// fails, or hits the turn bound.
    ///
    /// Capacity and turn-bound violations come back as a terminal
    /// [`TaskStatus`] inside the report, never as a raised fault; `Err` is
    /// reserved for caller mistakes (unknown agent, missing queen).
    pub async fn run(
        &self,
        starting_agent: &str,
        messages: Vec<Message>,
        context: HashMap<String, serde_json::Value>,
        max_turns: Option<u32>,
    ) -> SwarmgateResult<TaskReport> {
        self.check_queen_requirement().await?;
        let mut current = self.agent(starting_agent).await.ok_or_else(|| {
            SwarmgateError::Swarm(format!("unknown starting agent '{starting_agent}'"))
        })?;
        let max_turns = max_turns.unwrap_or(self.config.default_max_turns);

        let task_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        self.active.write().await.insert(task_id, cancel.clone());
        let started = Instant::now();
        debug!(task = %task_id, agent = %current.name(), max_turns, "task started");

        let mut messages = messages;
        let mut context = context;
        let mut history: Vec<TurnRecord> = Vec::new();
        let mut turns: u32 = 0;
        let mut output: Option<String> = None;

        let status = loop {
            if turns == max_turns {
                break TaskStatus::MaxTurnsExceeded;
            }
            turns += 1;

            self.mark(current.name(), AgentStatus::Busy).await;
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    // The agent was marked busy above; do not leave it stuck.
                    self.mark(current.name(), AgentStatus::Ready).await;
                    break TaskStatus::Failed {
                        reason: "task cancelled".to_string(),
                    };
                }
                result = current.execute(&messages, &context) => result,
            };
            history.push(TurnRecord {
                agent: current.name().to_string(),
                result: result.clone(),
                timestamp: Utc::now(),
            });
            context = result.context;

            match result.outcome {
                TurnOutcome::Failed { message, .. } => {
                    self.mark(current.name(), AgentStatus::Error).await;
                    break TaskStatus::Failed { reason: message };
                }
                TurnOutcome::Handoff {
                    agent,
                    context: handoff_context,
                } => {
                    self.mark(current.name(), AgentStatus::Ready).await;
                    let Some(next) = self.agent(&agent).await else {
                        break TaskStatus::Failed {
                            reason: format!("handoff to unknown agent '{agent}'"),
                        };
                    };
                    context.extend(handoff_context);
                    debug!(task = %task_id, from = %current.name(), to = %agent, "handoff");
                    current = next;
                }
                TurnOutcome::ToolCalls { content, calls } => {
                    self.mark(current.name(), AgentStatus::Ready).await;
                    if let Some(text) = content {
                        messages.push(Message::assistant(text));
                    }
                    let mut handoff = None;
                    for call in calls {
                        let tool_result = self.execute_tool(&current, &call).await;
                        match tool_result {
                            ToolInvocation::Result(result) => {
                                messages.push(tool_message(result));
                            }
                            ToolInvocation::Handoff { agent, context } => {
                                handoff = Some((agent, context));
                            }
                        }
                    }
                    if let Some((agent, handoff_context)) = handoff {
                        let Some(next) = self.agent(&agent).await else {
                            break TaskStatus::Failed {
                                reason: format!("handoff to unknown agent '{agent}'"),
                            };
                        };
                        context.extend(handoff_context);
                        current = next;
                    }
                }
                TurnOutcome::Content { text } => {
                    self.mark(current.name(), AgentStatus::Ready).await;
                    messages.push(Message::assistant(text.clone()));
                    output = Some(text);
                    break TaskStatus::Completed;
                }
            }
        };

        self.active.write().await.remove(&task_id);
        let duration_ms = started.elapsed().as_millis() as u64;
        self.emit_terminal(task_id, &status, turns, duration_ms);

        Ok(TaskReport {
            id: task_id,
            status,
            turns,
            duration_ms,
            final_agent: Some(current.name().to_string()),
            history,
            messages,
            context,
            output,
        })
    }

    /// Fan a single input out to the named agents concurrently, wait for
    /// every invocation to resolve, and compute consensus over the results.
    ///
    /// Individual agent failures become failed entries in the result set so
    /// consensus still runs over the agents that succeeded.
    pub async fn run_parallel(
        &self,
        agent_names: &[String],
        messages: &[Message],
        context: &HashMap<String, serde_json::Value>,
    ) -> SwarmgateResult<ParallelOutcome> {
        self.check_queen_requirement().await?;
        if agent_names.is_empty() {
            return Err(SwarmgateError::Swarm(
                "parallel execution requires at least one agent".to_string(),
            ));
        }
        let mut agents = Vec::with_capacity(agent_names.len());
        for name in agent_names {
            let agent = self
                .agent(name)
                .await
                .ok_or_else(|| SwarmgateError::Swarm(format!("unknown agent '{name}'")))?;
            agents.push(agent);
        }

        // Fan-in barrier: every invocation resolves (the per-turn timeout
        // bounds a hung backend) before consensus is computed.
        let futures = agents.iter().map(|agent| {
            let agent = Arc::clone(agent);
            async move {
                let result = agent.execute(messages, context).await;
                (agent, result)
            }
        });
        let turn_results = join_all(futures).await;

        let results: Vec<ParallelResult> = turn_results
            .into_iter()
            .map(|(agent, result)| {
                let (content, error) = match result.outcome {
                    TurnOutcome::Content { text } => (Some(text), None),
                    TurnOutcome::ToolCalls { content, .. } => match content {
                        Some(text) => (Some(text), None),
                        None => (None, Some("agent requested tool calls".to_string())),
                    },
                    TurnOutcome::Handoff { agent, .. } => {
                        (None, Some(format!("agent requested handoff to '{agent}'")))
                    }
                    TurnOutcome::Failed { message, .. } => (None, Some(message)),
                };
                ParallelResult {
                    agent: agent.name().to_string(),
                    weight: agent.weight(),
                    content,
                    error,
                    elapsed_ms: result.elapsed_ms,
                }
            })
            .collect();

        let queen = self.queen.read().await.clone();
        let consensus = consensus::decide(self.config.consensus, &results, queen.as_deref());
        match &consensus {
            Consensus::Decided { agreement, .. } => {
                info!(swarm = %self.id, agents = results.len(), agreement, "consensus reached");
            }
            Consensus::NoQuorum { votes, required } => {
                warn!(swarm = %self.id, votes, required, "no consensus quorum");
            }
        }
        Ok(ParallelOutcome { results, consensus })
    }

    async fn execute_tool(
        &self,
        agent: &WorkerAgent,
        call: &swarmgate_core::ToolCall,
    ) -> ToolInvocation {
        let Some(tool) = agent.find_tool(&call.name) else {
            // A missing tool is a per-call error, not a task failure.
            return ToolInvocation::Result(ToolResult::error(
                &call.id,
                format!("tool '{}' not found", call.name),
            ));
        };
        match tool.handler.invoke(call.arguments.clone()).await {
            Ok(ToolEffect::Output(output)) => {
                ToolInvocation::Result(ToolResult::success(&call.id, output))
            }
            Ok(ToolEffect::Handoff { agent, context }) => {
                ToolInvocation::Handoff { agent, context }
            }
            Err(e) => ToolInvocation::Result(ToolResult::error(
                &call.id,
                format!("tool '{}' failed: {e}", call.name),
            )),
        }
    }

    fn emit_terminal(&self, task_id: Uuid, status: &TaskStatus, turns: u32, duration_ms: u64) {
        let event = match status {
            TaskStatus::Completed => {
                info!(task = %task_id, turns, duration_ms, "task completed");
                SwarmEvent::TaskCompleted {
                    task_id,
                    turns,
                    duration_ms,
                }
            }
            TaskStatus::Failed { reason } => {
                warn!(task = %task_id, turns, reason = %reason, "task failed");
                SwarmEvent::TaskFailed {
                    task_id,
                    turns,
                    duration_ms,
                    reason: reason.clone(),
                }
            }
            TaskStatus::MaxTurnsExceeded => {
                warn!(task = %task_id, turns, "task exceeded turn bound");
                SwarmEvent::TaskFailed {
                    task_id,
                    turns,
                    duration_ms,
                    reason: "max turns exceeded".to_string(),
                }
            }
            TaskStatus::Running => return,
        };
        self.events.emit(Event::Swarm(event));
    }
}

impl std::fmt::Debug for Swarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swarm")
            .field("id", &self.id)
            .field("topology", &self.config.topology)
            .field("consensus", &self.config.consensus)
            .finish_non_exhaustive()
    }
}

enum ToolInvocation {
    Result(ToolResult),
    Handoff {
        agent: String,
        context: HashMap<String, serde_json::Value>,
    },
}

fn tool_message(result: ToolResult) -> Message {
    if result.is_error {
        Message::tool(format!("[tool error] {}", result.content))
    } else {
        Message::tool(result.content)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ConsensusType;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use swarmgate_agent::{
        AgentTool, Completion, CompletionBackend, ToolHandler, WorkerConfig, HANDOFF_TOOL,
    };
    use swarmgate_core::{AgentRole, ToolCall};

    /// Backend that replays a fixed sequence of completions.
    struct Scripted(Mutex<VecDeque<Completion>>);

    impl Scripted {
        fn new(completions: Vec<Completion>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(completions.into())))
        }
    }

    #[async_trait]
    impl CompletionBackend for Scripted {
        async fn complete(
            &self,
            _system_prompt: &str,
            _conversation: &[Message],
        ) -> SwarmgateResult<Completion> {
            let next = self.0.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| Completion::text("script exhausted")))
        }
    }

    struct Hanging;

    #[async_trait]
    impl CompletionBackend for Hanging {
        async fn complete(
            &self,
            _system_prompt: &str,
            _conversation: &[Message],
        ) -> SwarmgateResult<Completion> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Completion::default())
        }
    }

    struct Failing;

    #[async_trait]
    impl CompletionBackend for Failing {
        async fn complete(
            &self,
            _system_prompt: &str,
            _conversation: &[Message],
        ) -> SwarmgateResult<Completion> {
            Err(SwarmgateError::Agent("backend unavailable".to_string()))
        }
    }

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        async fn invoke(&self, arguments: serde_json::Value) -> SwarmgateResult<ToolEffect> {
            Ok(ToolEffect::Output(arguments.to_string()))
        }
    }

    fn text(content: &str) -> Completion {
        Completion::text(content)
    }

    fn tool_call(name: &str) -> Completion {
        Completion {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "c1".to_string(),
                name: name.to_string(),
                arguments: serde_json::json!({"q": 1}),
            }],
            usage: Default::default(),
        }
    }

    fn handoff_to(agent: &str, context: serde_json::Value) -> Completion {
        Completion {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "h1".to_string(),
                name: HANDOFF_TOOL.to_string(),
                arguments: serde_json::json!({"agent": agent, "context": context}),
            }],
            usage: Default::default(),
        }
    }

    fn worker(name: &str, backend: Arc<dyn CompletionBackend>) -> WorkerAgent {
        WorkerAgent::new(WorkerConfig::new(name, AgentRole::General, "work"), backend)
    }

    fn worker_weighted(
        name: &str,
        capabilities: &[&str],
        backend: Arc<dyn CompletionBackend>,
    ) -> WorkerAgent {
        let config = WorkerConfig::new(name, AgentRole::General, "work")
            .with_capabilities(capabilities.iter().map(|c| c.to_string()).collect());
        WorkerAgent::new(config, backend)
    }

    fn swarm(consensus: ConsensusType) -> Swarm {
        Swarm::new(SwarmConfig::new(Topology::Mesh, consensus)).unwrap()
    }

    #[tokio::test]
    async fn test_run_completes_with_content() {
        let s = swarm(ConsensusType::Majority);
        s.add_agent(worker("a", Scripted::new(vec![text("done")])))
            .await
            .unwrap();

        let report = s
            .run("a", vec![Message::user("go")], HashMap::new(), None)
            .await
            .unwrap();
        assert_eq!(report.status, TaskStatus::Completed);
        assert_eq!(report.turns, 1);
        assert_eq!(report.output.as_deref(), Some("done"));
        assert_eq!(report.final_agent.as_deref(), Some("a"));
        assert!(s.active_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_bound() {
        let config = SwarmConfig {
            capacity: 1,
            ..SwarmConfig::default()
        };
        let s = Swarm::new(config).unwrap();
        s.add_agent(worker("a", Scripted::new(vec![])))
            .await
            .unwrap();
        let err = s.add_agent(worker("b", Scripted::new(vec![]))).await;
        assert!(err.is_err());
        assert_eq!(s.agent_count().await, 1);
    }

    #[tokio::test]
    async fn test_max_turns_never_runs_extra_turn() {
        // The agent requests a tool every turn, so the task can never
        // complete on its own.
        let s = swarm(ConsensusType::Majority);
        let agent = worker(
            "a",
            Scripted::new(vec![tool_call("echo"), tool_call("echo"), tool_call("echo"), tool_call("echo")]),
        )
        .with_tool(AgentTool::new(
            "echo",
            "echoes its arguments",
            serde_json::json!({}),
            Arc::new(EchoTool),
        ));
        s.add_agent(agent).await.unwrap();

        let report = s
            .run("a", vec![Message::user("go")], HashMap::new(), Some(3))
            .await
            .unwrap();
        assert_eq!(report.status, TaskStatus::MaxTurnsExceeded);
        assert_eq!(report.turns, 3);
        assert_eq!(report.history.len(), 3);
    }

    #[tokio::test]
    async fn test_handoff_preserves_conversation_and_context() {
        let s = swarm(ConsensusType::Majority);
        s.add_agent(worker(
            "a",
            Scripted::new(vec![handoff_to("b", serde_json::json!({"stage": "review"}))]),
        ))
        .await
        .unwrap();
        s.add_agent(worker("b", Scripted::new(vec![text("reviewed")])))
            .await
            .unwrap();

        let mut context = HashMap::new();
        context.insert("origin".to_string(), serde_json::json!("a"));
        let report = s
            .run("a", vec![Message::user("review this")], context, None)
            .await
            .unwrap();

        assert_eq!(report.status, TaskStatus::Completed);
        assert_eq!(report.final_agent.as_deref(), Some("b"));
        assert_eq!(report.history[0].agent, "a");
        assert_eq!(report.history[1].agent, "b");
        // A's prior context keys survive; B's handoff keys are merged in.
        assert_eq!(report.context["origin"], "a");
        assert_eq!(report.context["stage"], "review");
        // The conversation is not consumed by the handoff.
        assert_eq!(report.messages[0].content, "review this");
    }

    #[tokio::test]
    async fn test_missing_tool_is_per_call_error_not_task_failure() {
        let s = swarm(ConsensusType::Majority);
        s.add_agent(worker(
            "a",
            Scripted::new(vec![tool_call("nope"), text("done")]),
        ))
        .await
        .unwrap();

        let report = s
            .run("a", vec![Message::user("go")], HashMap::new(), None)
            .await
            .unwrap();
        assert_eq!(report.status, TaskStatus::Completed);
        assert!(report
            .messages
            .iter()
            .any(|m| m.content.contains("'nope' not found")));
    }

    #[tokio::test]
    async fn test_agent_failure_terminates_task_only() {
        let s = swarm(ConsensusType::Majority);
        s.add_agent(worker("a", Arc::new(Failing))).await.unwrap();
        s.add_agent(worker("b", Scripted::new(vec![text("fine")])))
            .await
            .unwrap();

        let report = s
            .run("a", vec![Message::user("go")], HashMap::new(), None)
            .await
            .unwrap();
        assert!(matches!(report.status, TaskStatus::Failed { .. }));

        // Other tasks are unaffected.
        let report = s
            .run("b", vec![Message::user("go")], HashMap::new(), None)
            .await
            .unwrap();
        assert_eq!(report.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_task() {
        let s = Arc::new(swarm(ConsensusType::Majority));
        s.add_agent(worker("a", Arc::new(Hanging))).await.unwrap();

        let runner = {
            let s = Arc::clone(&s);
            tokio::spawn(async move {
                s.run("a", vec![Message::user("go")], HashMap::new(), None)
                    .await
            })
        };
        // Wait for the task to register as active, then cancel it.
        let task_id = loop {
            let active = s.active_tasks().await;
            if let Some(id) = active.first() {
                break *id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert!(s.cancel(task_id).await);

        let report = runner.await.unwrap().unwrap();
        assert!(
            matches!(report.status, TaskStatus::Failed { ref reason } if reason.contains("cancelled"))
        );
        assert!(s.active_tasks().await.is_empty());
    }

    /// A hub (auth disabled) with one registered agent and a receiver
    /// observing everything broadcast to that agent's connection.
    async fn hub_with_agent(
        agent_id: &str,
    ) -> (
        Arc<Hub>,
        tokio::sync::mpsc::UnboundedReceiver<swarmgate_hub::Outbound>,
    ) {
        let hub = Hub::new(swarmgate_hub::HubConfig::default(), Arc::new(NullSink));
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let conn = hub.accept("test", tx).await;
        hub.handle_frame(
            &conn,
            &format!(r#"{{"type":"agent_register","agentId":"{agent_id}","role":"general"}}"#),
        )
        .await;
        (hub, rx)
    }

    fn drain_status_frames(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<swarmgate_hub::Outbound>,
    ) -> Vec<String> {
        let mut statuses = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let swarmgate_hub::Outbound::Frame(json) = item {
                let v: serde_json::Value = serde_json::from_str(&json).unwrap();
                if v["type"] == "agent_status" {
                    statuses.push(v["status"].as_str().unwrap().to_string());
                }
            }
        }
        statuses
    }

    #[tokio::test]
    async fn test_hub_attached_run_broadcasts_status_transitions() {
        let (hub, mut rx) = hub_with_agent("a").await;
        let s = Swarm::new(SwarmConfig::default())
            .unwrap()
            .with_hub(Arc::clone(&hub));
        s.add_agent(worker("a", Scripted::new(vec![text("done")])))
            .await
            .unwrap();

        let report = s
            .run("a", vec![Message::user("go")], HashMap::new(), None)
            .await
            .unwrap();
        assert_eq!(report.status, TaskStatus::Completed);
        assert_eq!(drain_status_frames(&mut rx), vec!["busy", "ready"]);
        assert_eq!(hub.get_agent_status("a").await, Some(AgentStatus::Ready));
    }

    #[tokio::test]
    async fn test_cancel_does_not_leave_agent_busy() {
        let (hub, _rx) = hub_with_agent("a").await;
        let s = Arc::new(
            Swarm::new(SwarmConfig::default())
                .unwrap()
                .with_hub(Arc::clone(&hub)),
        );
        s.add_agent(worker("a", Arc::new(Hanging))).await.unwrap();

        let runner = {
            let s = Arc::clone(&s);
            tokio::spawn(async move {
                s.run("a", vec![Message::user("go")], HashMap::new(), None)
                    .await
            })
        };
        let task_id = loop {
            let active = s.active_tasks().await;
            if let Some(id) = active.first() {
                break *id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        // Wait for the turn to be marked busy so cancellation lands mid-turn.
        while hub.get_agent_status("a").await != Some(AgentStatus::Busy) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(s.cancel(task_id).await);

        let report = runner.await.unwrap().unwrap();
        assert!(matches!(report.status, TaskStatus::Failed { .. }));
        assert_eq!(hub.get_agent_status("a").await, Some(AgentStatus::Ready));
    }

    #[tokio::test]
    async fn test_unknown_starting_agent_is_an_error() {
        let s = swarm(ConsensusType::Majority);
        let result = s
            .run("ghost", vec![Message::user("go")], HashMap::new(), None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_parallel_majority() {
        let s = swarm(ConsensusType::Majority);
        for (name, answer) in [("a", "x"), ("b", "x"), ("c", "y")] {
            s.add_agent(worker(name, Scripted::new(vec![text(answer)])))
                .await
                .unwrap();
        }
        let names: Vec<String> = ["a", "b", "c"].iter().map(|n| n.to_string()).collect();
        let outcome = s
            .run_parallel(&names, &[Message::user("go")], &HashMap::new())
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 3);
        assert!(
            matches!(outcome.consensus, Consensus::Decided { ref content, .. } if content == "x")
        );
    }

    #[tokio::test]
    async fn test_parallel_weighted() {
        let s = swarm(ConsensusType::Weighted);
        s.add_agent(worker_weighted("a", &[], Scripted::new(vec![text("x")])))
            .await
            .unwrap();
        s.add_agent(worker_weighted("b", &[], Scripted::new(vec![text("x")])))
            .await
            .unwrap();
        s.add_agent(worker_weighted(
            "c",
            &["lint", "build", "test", "deploy", "audit"],
            Scripted::new(vec![text("y")]),
        ))
        .await
        .unwrap();

        let names: Vec<String> = ["a", "b", "c"].iter().map(|n| n.to_string()).collect();
        let outcome = s
            .run_parallel(&names, &[Message::user("go")], &HashMap::new())
            .await
            .unwrap();
        assert!(
            matches!(outcome.consensus, Consensus::Decided { ref content, .. } if content == "y")
        );
    }

    #[tokio::test]
    async fn test_parallel_failure_included_as_failed_entry() {
        let s = swarm(ConsensusType::Majority);
        s.add_agent(worker("a", Scripted::new(vec![text("x")])))
            .await
            .unwrap();
        s.add_agent(worker("b", Scripted::new(vec![text("x")])))
            .await
            .unwrap();
        s.add_agent(worker("c", Arc::new(Failing))).await.unwrap();

        let names: Vec<String> = ["a", "b", "c"].iter().map(|n| n.to_string()).collect();
        let outcome = s
            .run_parallel(&names, &[Message::user("go")], &HashMap::new())
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.results.iter().filter(|r| r.is_success()).count(), 2);
        assert!(
            matches!(outcome.consensus, Consensus::Decided { ref content, .. } if content == "x")
        );
    }

    #[tokio::test]
    async fn test_hierarchical_leader_queen_wins_over_agreeing_workers() {
        let s = Swarm::new(SwarmConfig::new(Topology::Hierarchical, ConsensusType::Leader))
            .unwrap();
        s.add_agent(worker("queen", Scripted::new(vec![text("q-answer")])))
            .await
            .unwrap();
        s.add_agent(worker("w1", Scripted::new(vec![text("w-answer")])))
            .await
            .unwrap();
        s.add_agent(worker("w2", Scripted::new(vec![text("w-answer")])))
            .await
            .unwrap();
        s.set_queen("queen").await.unwrap();

        let names: Vec<String> = ["queen", "w1", "w2"].iter().map(|n| n.to_string()).collect();
        let outcome = s
            .run_parallel(&names, &[Message::user("go")], &HashMap::new())
            .await
            .unwrap();
        match outcome.consensus {
            Consensus::Decided {
                content,
                leader_fallback,
                ..
            } => {
                assert_eq!(content, "q-answer");
                assert!(!leader_fallback);
            }
            other => panic!("expected decision, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_hierarchical_requires_queen() {
        let s = Swarm::new(SwarmConfig::new(Topology::Hierarchical, ConsensusType::Leader))
            .unwrap();
        s.add_agent(worker("a", Scripted::new(vec![text("x")])))
            .await
            .unwrap();
        let result = s
            .run("a", vec![Message::user("go")], HashMap::new(), None)
            .await;
        assert!(result.is_err());
    }
}
