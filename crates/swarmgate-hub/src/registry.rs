use crate::protocol::ServerFrame;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use swarmgate_core::AgentRole;
use swarmgate_security::RateWindow;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Items carried on a connection's outbound channel. The writer task owns
/// the socket; everything else talks to it through this enum.
#[derive(Debug)]
pub enum Outbound {
    /// A serialized JSON text frame.
    Frame(String),
    /// A transport-level heartbeat ping.
    Ping,
    /// Close the socket with the given code, then stop the writer.
    Close { code: u16, reason: String },
}

/// Channel half used to push outbound items to a connection's writer task.
pub type FrameSender = mpsc::UnboundedSender<Outbound>;

/// Authentication state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Unauthenticated,
    Authenticated,
    Closed,
}

#[derive(Debug)]
struct ConnInner {
    state: ConnState,
    user_id: Option<String>,
    agent_id: Option<String>,
    role: Option<AgentRole>,
    rooms: HashSet<String>,
    messages: u64,
}

/// One accepted transport stream. Exclusively owned by the
/// [`SessionRegistry`]; destroyed on transport close.
pub struct Connection {
    pub id: Uuid,
    pub remote: String,
    pub tx: FrameSender,
    pub connected_at: DateTime<Utc>,
    inner: parking_lot::Mutex<ConnInner>,
    /// Per-connection rate window; no lock shared across connections.
    pub rate: parking_lot::Mutex<RateWindow>,
    last_pong: parking_lot::Mutex<Instant>,
}

impl Connection {
    pub fn new(remote: impl Into<String>, tx: FrameSender, authenticated: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            remote: remote.into(),
            tx,
            connected_at: Utc::now(),
            inner: parking_lot::Mutex::new(ConnInner {
                state: if authenticated {
                    ConnState::Authenticated
                } else {
                    ConnState::Unauthenticated
                },
                user_id: None,
                agent_id: None,
                role: None,
                rooms: HashSet::new(),
                messages: 0,
            }),
            rate: parking_lot::Mutex::new(RateWindow::new()),
            last_pong: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Serialize and enqueue a frame; delivery is best-effort.
    pub fn send(&self, frame: &ServerFrame) {
        let _ = self.tx.send(Outbound::Frame(frame.to_json()));
    }

    /// Enqueue a close frame; the writer shuts the socket down.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        self.inner.lock().state = ConnState::Closed;
        let _ = self.tx.send(Outbound::Close {
            code,
            reason: reason.into(),
        });
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.lock().state == ConnState::Authenticated
    }

    /// Transition to Authenticated, keeping any identity already stored
    /// (repeated auths are idempotent with respect to identity).
    pub fn authenticate(&self, user_id: Option<String>) -> Option<String> {
        let mut inner = self.inner.lock();
        inner.state = ConnState::Authenticated;
        if inner.user_id.is_none() {
            inner.user_id = user_id;
        }
        inner.user_id.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.lock().user_id.clone()
    }

    pub fn agent_id(&self) -> Option<String> {
        self.inner.lock().agent_id.clone()
    }

    pub fn role(&self) -> Option<AgentRole> {
        self.inner.lock().role
    }

    /// Stamp the agent identity. Set at most once per connection lifetime.
    pub fn set_agent(&self, agent_id: &str, role: AgentRole) -> Result<(), String> {
        let mut inner = self.inner.lock();
        if inner.agent_id.is_some() {
            return Err("an agent is already registered on this connection".to_string());
        }
        inner.agent_id = Some(agent_id.to_string());
        inner.role = Some(role);
        Ok(())
    }

    pub fn add_room(&self, room_id: &str) {
        self.inner.lock().rooms.insert(room_id.to_string());
    }

    pub fn remove_room(&self, room_id: &str) {
        self.inner.lock().rooms.remove(room_id);
    }

    pub fn is_in_room(&self, room_id: &str) -> bool {
        self.inner.lock().rooms.contains(room_id)
    }

    pub fn rooms(&self) -> Vec<String> {
        self.inner.lock().rooms.iter().cloned().collect()
    }

    pub fn count_message(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.messages += 1;
        inner.messages
    }

    /// Record a transport-level pong.
    pub fn touch_pong(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last transport-level pong (or since connect).
    pub fn pong_age(&self) -> std::time::Duration {
        self.last_pong.lock().elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

/// Owns all live connections.
pub struct SessionRegistry {
    connections: RwLock<HashMap<Uuid, Arc<Connection>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add(&self, conn: Arc<Connection>) {
        let id = conn.id;
        self.connections.write().await.insert(id, conn);
        tracing::debug!(connection_id = %id, "connection added");
    }

    pub async fn remove(&self, id: Uuid) -> Option<Arc<Connection>> {
        let removed = self.connections.write().await.remove(&id);
        if removed.is_some() {
            tracing::debug!(connection_id = %id, "connection removed");
        }
        removed
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Connection>> {
        self.connections.read().await.get(&id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Stable snapshot of all connections; safe to act on while connects
    /// and disconnects proceed concurrently.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Send a frame to every connection except `exclude`.
    pub async fn broadcast(&self, frame: &ServerFrame, exclude: Option<Uuid>) {
        let json = frame.to_json();
        let conns = self.connections.read().await;
        for conn in conns.values() {
            if Some(conn.id) != exclude {
                let _ = conn.tx.send(Outbound::Frame(json.clone()));
            }
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
