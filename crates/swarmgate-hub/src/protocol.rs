use crate::directory::AgentStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use swarmgate_core::AgentRole;
use uuid::Uuid;

/// WebSocket close code for normal closure (including server shutdown).
pub const CLOSE_NORMAL: u16 = 1000;
/// WebSocket close code for policy violation (authentication failure).
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Sender descriptor carried on every routed envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<AgentRole>,
}

/// An immutable, timestamped message record: the unit of routing and
/// history storage. Never mutated after delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    pub sender: SenderInfo,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Envelope {
    pub fn new(
        room_id: Option<String>,
        sender: SenderInfo,
        content: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            sender,
            content: content.into(),
            timestamp: Utc::now(),
            metadata,
        }
    }
}

/// Client → server frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    Auth {
        token: String,
        #[serde(default)]
        user_id: Option<String>,
    },
    AgentRegister {
        agent_id: String,
        role: String,
        #[serde(default)]
        capabilities: Vec<String>,
        #[serde(default)]
        metadata: HashMap<String, serde_json::Value>,
    },
    Message {
        #[serde(default)]
        room_id: Option<String>,
        content: String,
        #[serde(default)]
        target_agent_id: Option<String>,
        #[serde(default)]
        metadata: HashMap<String, serde_json::Value>,
    },
    JoinRoom {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
    Typing {
        room_id: String,
        is_typing: bool,
    },
    Ping,
}

/// The set of client frame type tags the hub understands.
pub const CLIENT_FRAME_TYPES: [&str; 7] = [
    "auth",
    "agent_register",
    "message",
    "join_room",
    "leave_room",
    "typing",
    "ping",
];

/// Server → client frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    AuthSuccess {
        client_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    AuthError {
        message: String,
    },
    Message(Envelope),
    MessageAck {
        message_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    UserJoined {
        room_id: String,
        user: SenderInfo,
    },
    UserLeft {
        room_id: String,
        user: SenderInfo,
    },
    TypingIndicator {
        room_id: String,
        user: SenderInfo,
        is_typing: bool,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after: Option<u64>,
    },
    AgentStatus {
        agent_id: String,
        status: AgentStatus,
        timestamp: DateTime<Utc>,
    },
    AgentReady {
        agent_id: String,
        message: String,
    },
    RoomHistory {
        room_id: String,
        messages: Vec<Envelope>,
    },
    Shutdown {
        message: String,
    },
}

impl ServerFrame {
    /// An `error` frame with no retry hint.
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Serialize to a JSON text frame.
    ///
    /// Frames are built from owned data and always serialize; a failure here
    /// is a programming error surfaced through logs rather than a panic.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize server frame");
            r#"{"type":"error","message":"internal serialization error"}"#.to_string()
        })
    }
}

/// Parse one inbound text frame.
///
/// Distinguishes malformed JSON, unknown frame types, and frames of a known
/// type with missing or invalid fields, so the hub can answer each with the
/// right protocol error while keeping the connection open.
pub fn parse_client_frame(text: &str) -> Result<ClientFrame, String> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("malformed frame: {e}"))?;

    let frame_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| "missing frame type".to_string())?
        .to_string();

    if !CLIENT_FRAME_TYPES.contains(&frame_type.as_str()) {
        return Err(format!("unknown message type: {frame_type}"));
    }

    serde_json::from_value(value).map_err(|e| format!("invalid {frame_type} frame: {e}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auth_frame() {
        let frame = parse_client_frame(r#"{"type":"auth","token":"t","userId":"alice"}"#).unwrap();
        match frame {
            ClientFrame::Auth { token, user_id } => {
                assert_eq!(token, "t");
                assert_eq!(user_id.as_deref(), Some("alice"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_parse_message_frame_camel_case_fields() {
        let frame = parse_client_frame(
            r#"{"type":"message","roomId":"r1","content":"hi","targetAgentId":"coder-1"}"#,
        )
        .unwrap();
        match frame {
            ClientFrame::Message {
                room_id,
                content,
                target_agent_id,
                ..
            } => {
                assert_eq!(room_id.as_deref(), Some("r1"));
                assert_eq!(content, "hi");
                assert_eq!(target_agent_id.as_deref(), Some("coder-1"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_reported() {
        let err = parse_client_frame(r#"{"type":"teleport"}"#).unwrap_err();
        assert!(err.contains("unknown message type"));
    }

    #[test]
    fn test_missing_field_reported_as_invalid() {
        let err = parse_client_frame(r#"{"type":"join_room"}"#).unwrap_err();
        assert!(err.contains("invalid join_room frame"));
    }

    #[test]
    fn test_malformed_json_reported() {
        let err = parse_client_frame("not json").unwrap_err();
        assert!(err.contains("malformed frame"));
    }

    #[test]
    fn test_server_frame_tags_and_fields() {
        let frame = ServerFrame::MessageAck {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        };
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["type"], "message_ack");
        assert!(json["messageId"].is_string());
    }

    #[test]
    fn test_message_delivery_flattens_envelope() {
        let env = Envelope::new(
            Some("r1".to_string()),
            SenderInfo {
                user_id: Some("alice".to_string()),
                ..SenderInfo::default()
            },
            "hello",
            HashMap::new(),
        );
        let json: serde_json::Value =
            serde_json::from_str(&ServerFrame::Message(env).to_json()).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["roomId"], "r1");
        assert_eq!(json["content"], "hello");
        assert_eq!(json["sender"]["userId"], "alice");
    }
}
