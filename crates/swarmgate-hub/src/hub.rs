use crate::config::HubConfig;
use crate::directory::{AgentDirectory, AgentStatus};
use crate::protocol::{
    parse_client_frame, ClientFrame, Envelope, SenderInfo, ServerFrame, CLOSE_NORMAL,
    CLOSE_POLICY_VIOLATION,
};
use crate::registry::{Connection, Outbound, SessionRegistry};
use crate::room::{JoinOutcome, RoomStore};
use crate::router::MessageRouter;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use swarmgate_core::{AgentRole, Event, EventSink, HubEvent};
use swarmgate_security::{ContentGuard, RateDecision, RateGovernor, Sanitizer, TokenVerifier};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Cross-cutting read snapshot of hub state; safe to call concurrently
/// with every mutation path.
#[derive(Debug, Clone, Serialize)]
pub struct HubStatus {
    pub connections: usize,
    pub agents: usize,
    pub rooms: usize,
    pub agents_by_role: HashMap<String, usize>,
    pub uptime_secs: u64,
}

/// The hub façade: composes the rate governor, session registry, room
/// store, message router, and agent directory into the connection
/// lifecycle, and exposes the control API used by the orchestrator.
///
/// Construct one instance per process and pass it by handle; tests build
/// fresh instances per case.
pub struct Hub {
    config: HubConfig,
    registry: Arc<SessionRegistry>,
    rooms: Arc<RoomStore>,
    directory: Arc<AgentDirectory>,
    router: MessageRouter,
    governor: RateGovernor,
    verifier: TokenVerifier,
    events: Arc<dyn EventSink>,
    started_at: Instant,
}

impl Hub {
    pub fn new(config: HubConfig, events: Arc<dyn EventSink>) -> Arc<Self> {
        Self::with_guard(config, events, Arc::new(Sanitizer::default()))
    }

    /// Build with a custom content-security collaborator.
    pub fn with_guard(
        config: HubConfig,
        events: Arc<dyn EventSink>,
        guard: Arc<dyn ContentGuard>,
    ) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry::new());
        let rooms = Arc::new(RoomStore::new(config.room_member_cap, config.history_cap));
        let directory = Arc::new(AgentDirectory::new());
        let router = MessageRouter::new(
            registry.clone(),
            rooms.clone(),
            directory.clone(),
            guard,
            events.clone(),
            config.default_room.clone(),
        );
        Arc::new(Self {
            governor: RateGovernor::new(config.rate_limit, config.rate_window),
            verifier: TokenVerifier::new(config.shared_secret.clone()),
            config,
            registry,
            rooms,
            directory,
            router,
            events,
            started_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Accept a new transport stream. With auth disabled the connection is
    /// admitted directly under a generated pseudo-identity.
    pub async fn accept(
        &self,
        remote: impl Into<String>,
        tx: mpsc::UnboundedSender<Outbound>,
    ) -> Arc<Connection> {
        let auth_disabled = !self.verifier.is_enabled();
        let conn = Arc::new(Connection::new(remote, tx, auth_disabled));
        if auth_disabled {
            let pseudo = format!("anon-{}", &conn.id.simple().to_string()[..8]);
            let user_id = conn.authenticate(Some(pseudo));
            conn.send(&ServerFrame::AuthSuccess {
                client_id: conn.id,
                user_id,
                message: Some("authentication disabled".to_string()),
            });
        }
        info!(connection_id = %conn.id, remote = %conn.remote, "connection accepted");
        self.registry.add(conn.clone()).await;
        conn
    }

    /// Handle one inbound text frame from a connection.
    pub async fn handle_frame(&self, conn: &Arc<Connection>, text: &str) {
        let decision = {
            let mut window = conn.rate.lock();
            self.governor.check(&mut window)
        };
        if let RateDecision::Limited { retry_after } = decision {
            conn.send(&ServerFrame::Error {
                message: "rate limit exceeded".to_string(),
                retry_after: Some(retry_after.as_secs()),
            });
            return;
        }

        let frame = match parse_client_frame(text) {
            Ok(frame) => frame,
            Err(reason) => {
                conn.send(&ServerFrame::error(reason));
                return;
            }
        };

        match frame {
            ClientFrame::Ping => {
                conn.send(&ServerFrame::Pong {
                    timestamp: Utc::now(),
                });
            }
            ClientFrame::Auth { token, user_id } => self.handle_auth(conn, &token, user_id),
            ClientFrame::LeaveRoom { room_id } => {
                // Leave is best-effort cleanup and exempt from auth checks.
                self.handle_leave(conn, &room_id).await;
            }
            _ if !conn.is_authenticated() => {
                conn.send(&ServerFrame::error("authentication required"));
            }
            ClientFrame::AgentRegister {
                agent_id,
                role,
                capabilities,
                metadata,
            } => {
                self.handle_register(conn, &agent_id, &role, capabilities, metadata)
                    .await;
            }
            ClientFrame::Message {
                room_id,
                content,
                target_agent_id,
                metadata,
            } => {
                self.router
                    .route(conn, room_id, &content, target_agent_id, metadata)
                    .await;
            }
            ClientFrame::JoinRoom { room_id } => self.handle_join(conn, &room_id).await,
            ClientFrame::Typing { room_id, is_typing } => {
                let indicator = ServerFrame::TypingIndicator {
                    room_id: room_id.clone(),
                    user: self.sender_info(conn),
                    is_typing,
                };
                // Silently ignored when the sender is not a member.
                self.rooms
                    .relay(&room_id, &indicator.to_json(), conn.id)
                    .await;
            }
        }
    }

    fn handle_auth(&self, conn: &Arc<Connection>, token: &str, user_id: Option<String>) {
        if conn.is_authenticated() {
            // Idempotent with respect to the stored identity.
            conn.send(&ServerFrame::AuthSuccess {
                client_id: conn.id,
                user_id: conn.user_id(),
                message: Some("already authenticated".to_string()),
            });
            return;
        }
        if self.verifier.verify(token) {
            let resolved = conn.authenticate(user_id);
            conn.send(&ServerFrame::AuthSuccess {
                client_id: conn.id,
                user_id: resolved,
                message: None,
            });
            info!(connection_id = %conn.id, "authenticated");
        } else {
            warn!(connection_id = %conn.id, "authentication failed");
            conn.send(&ServerFrame::AuthError {
                message: "invalid token".to_string(),
            });
            conn.close(CLOSE_POLICY_VIOLATION, "authentication failed");
        }
    }

    async fn handle_register(
        &self,
        conn: &Arc<Connection>,
        agent_id: &str,
        role: &str,
        capabilities: Vec<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) {
        if agent_id.is_empty() {
            conn.send(&ServerFrame::error("agentId is required"));
            return;
        }
        let role: AgentRole = match role.parse() {
            Ok(role) => role,
            Err(e) => {
                conn.send(&ServerFrame::error(e));
                return;
            }
        };
        if conn.agent_id().is_some() {
            conn.send(&ServerFrame::error(
                "an agent is already registered on this connection",
            ));
            return;
        }
        // Claim the id in the directory first: a rejected registration must
        // leave the connection unstamped and free to register another id.
        if let Err(e) = self
            .directory
            .register(agent_id, role, capabilities, metadata, conn.id)
            .await
        {
            conn.send(&ServerFrame::error(e));
            return;
        }
        if let Err(e) = conn.set_agent(agent_id, role) {
            self.directory.remove(agent_id).await;
            conn.send(&ServerFrame::error(e));
            return;
        }

        conn.send(&ServerFrame::AgentReady {
            agent_id: agent_id.to_string(),
            message: format!("registered with role {role}"),
        });
        self.registry
            .broadcast(
                &ServerFrame::AgentStatus {
                    agent_id: agent_id.to_string(),
                    status: AgentStatus::Ready,
                    timestamp: Utc::now(),
                },
                Some(conn.id),
            )
            .await;
        self.events.emit(Event::Hub(HubEvent::AgentRegistered {
            agent_id: agent_id.to_string(),
            role,
        }));
    }

    async fn handle_join(&self, conn: &Arc<Connection>, room_id: &str) {
        let notice = ServerFrame::UserJoined {
            room_id: room_id.to_string(),
            user: self.sender_info(conn),
        };
        let outcome = self
            .rooms
            .join(
                room_id,
                conn.id,
                conn.tx.clone(),
                &notice.to_json(),
                self.config.history_replay,
            )
            .await;
        match outcome {
            JoinOutcome::Joined { history } => {
                conn.add_room(room_id);
                conn.send(&ServerFrame::RoomHistory {
                    room_id: room_id.to_string(),
                    messages: history,
                });
            }
            JoinOutcome::AlreadyMember => {
                conn.send(&ServerFrame::error(format!("already a member of {room_id}")));
            }
            JoinOutcome::Full => {
                conn.send(&ServerFrame::error(format!("room {room_id} is full")));
            }
        }
    }

    async fn handle_leave(&self, conn: &Arc<Connection>, room_id: &str) {
        let notice = ServerFrame::UserLeft {
            room_id: room_id.to_string(),
            user: self.sender_info(conn),
        };
        if self.rooms.leave(room_id, conn.id, &notice.to_json()).await {
            conn.remove_room(room_id);
        }
    }

    fn sender_info(&self, conn: &Connection) -> SenderInfo {
        SenderInfo {
            user_id: conn.user_id(),
            agent_id: conn.agent_id(),
            role: conn.role(),
        }
    }

    /// Cleanup after a transport close of any cause: leave all rooms with
    /// notifications, deregister owned agents, remove the connection.
    pub async fn cleanup_connection(&self, conn_id: Uuid) {
        let Some(conn) = self.registry.remove(conn_id).await else {
            return;
        };
        for room_id in conn.rooms() {
            let notice = ServerFrame::UserLeft {
                room_id: room_id.clone(),
                user: self.sender_info(&conn),
            };
            self.rooms.leave(&room_id, conn.id, &notice.to_json()).await;
        }
        for agent_id in self.directory.remove_by_connection(conn.id).await {
            self.events
                .emit(Event::Hub(HubEvent::AgentDeregistered {
                    agent_id: agent_id.clone(),
                }));
            self.registry
                .broadcast(
                    &ServerFrame::AgentStatus {
                        agent_id,
                        status: AgentStatus::Offline,
                        timestamp: Utc::now(),
                    },
                    None,
                )
                .await;
        }
        info!(connection_id = %conn_id, "connection cleaned up");
    }

    /// One heartbeat pass: ping every connection, terminate any that have
    /// gone silent past the timeout. Operates on a snapshot so concurrent
    /// connects and disconnects are tolerated.
    pub async fn heartbeat_sweep(&self) {
        let timeout = self.config.heartbeat_timeout;
        let mut stale = Vec::new();
        for conn in self.registry.snapshot().await {
            if conn.pong_age() > timeout {
                stale.push(conn);
            } else {
                let _ = conn.tx.send(Outbound::Ping);
            }
        }
        for conn in stale {
            warn!(connection_id = %conn.id, "heartbeat timeout, terminating");
            conn.close(CLOSE_NORMAL, "heartbeat timeout");
            self.cleanup_connection(conn.id).await;
        }
    }

    /// Spawn the periodic heartbeat task for this hub instance.
    pub fn start_heartbeat(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(hub.config.heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                hub.heartbeat_sweep().await;
            }
        })
    }

    /// Notify and close every connection with a normal-closure code.
    pub async fn shutdown(&self) {
        for conn in self.registry.snapshot().await {
            conn.send(&ServerFrame::Shutdown {
                message: "server shutting down".to_string(),
            });
            conn.close(CLOSE_NORMAL, "server shutdown");
            self.cleanup_connection(conn.id).await;
        }
        info!("hub shut down");
    }

    // --- Control API (used by the orchestrator and external callers) ---

    /// Deliver a message envelope directly to a registered agent.
    pub async fn send_to_agent(&self, agent_id: &str, content: &str, sender: SenderInfo) -> bool {
        let Some(conn_id) = self.directory.connection_of(agent_id).await else {
            return false;
        };
        let Some(target) = self.registry.get(conn_id).await else {
            return false;
        };
        let envelope = Envelope::new(None, sender, content, HashMap::new());
        target.send(&ServerFrame::Message(envelope));
        true
    }

    /// Fan a frame out to all members of a room.
    pub async fn broadcast_to_room(&self, room_id: &str, envelope: Envelope) -> usize {
        let json = ServerFrame::Message(envelope.clone()).to_json();
        self.rooms
            .publish(room_id, envelope, &json, Uuid::nil())
            .await
    }

    /// Fan a frame out to every connection.
    pub async fn broadcast_all(&self, frame: &ServerFrame) {
        self.registry.broadcast(frame, None).await;
    }

    /// Set an agent's status and broadcast the change.
    pub async fn set_agent_status(&self, agent_id: &str, status: AgentStatus) -> bool {
        if !self.directory.set_status(agent_id, status).await {
            return false;
        }
        self.registry
            .broadcast(
                &ServerFrame::AgentStatus {
                    agent_id: agent_id.to_string(),
                    status,
                    timestamp: Utc::now(),
                },
                None,
            )
            .await;
        true
    }

    pub async fn get_agent_status(&self, agent_id: &str) -> Option<AgentStatus> {
        self.directory.status_of(agent_id).await
    }

    /// Counts and role breakdown; the only cross-cutting read surface.
    pub async fn status(&self) -> HubStatus {
        HubStatus {
            connections: self.registry.count().await,
            agents: self.directory.count().await,
            rooms: self.rooms.room_count().await,
            agents_by_role: self.directory.role_breakdown().await,
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}
