use crate::hub::Hub;
use crate::registry::Outbound;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Axum application exposing the hub: `/ws` for the broker protocol and
/// unauthenticated read-only `/health` and `/metrics`.
pub struct HubServer;

impl HubServer {
    pub fn build(hub: Arc<Hub>) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(hub)
    }

    /// Serve on the given listener until `shutdown` resolves, then notify
    /// and close every connection.
    pub async fn serve(
        hub: Arc<Hub>,
        listener: tokio::net::TcpListener,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let app = Self::build(hub.clone());
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            hub.shutdown().await;
        })
        .await
    }
}

async fn health_handler(State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    let status = hub.status().await;
    Json(serde_json::json!({
        "status": "ok",
        "connections": status.connections,
        "agents": status.agents,
        "rooms": status.rooms,
        "uptime": status.uptime_secs,
    }))
}

async fn metrics_handler(State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    let status = hub.status().await;
    Json(serde_json::json!({
        "status": "ok",
        "connections": status.connections,
        "agents": status.agents,
        "rooms": status.rooms,
        "agentsByRole": status.agents_by_role,
        "uptimeSeconds": status.uptime_secs,
        "memoryBytes": process_memory_bytes(),
    }))
}

fn process_memory_bytes() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut sys = sysinfo::System::new();
    sys.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).map(|p| p.memory())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(hub): State<Arc<Hub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub, remote))
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, remote: SocketAddr) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    let conn = hub.accept(remote.to_string(), tx).await;
    let conn_id = conn.id;
    info!(connection_id = %conn_id, remote = %remote, "websocket connected");

    // Writer task: owns the sink; everything reaches the socket through
    // the connection's outbound channel.
    let send_task = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            let result = match item {
                Outbound::Frame(json) => ws_sender.send(Message::Text(json.into())).await,
                Outbound::Ping => ws_sender.send(Message::Ping(Vec::new().into())).await,
                Outbound::Close { code, reason } => {
                    let _ = ws_sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            };
            if result.is_err() {
                break;
            }
        }
    });

    // Reader task: frames are handled one at a time per connection, never
    // blocking on another connection's I/O.
    let reader_hub = hub.clone();
    let reader_conn = conn.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    reader_hub.handle_frame(&reader_conn, &text).await;
                }
                Message::Pong(_) => reader_conn.touch_pong(),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    hub.cleanup_connection(conn_id).await;
    debug!(connection_id = %conn_id, "websocket disconnected");
}
