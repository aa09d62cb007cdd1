use std::time::Duration;

/// Tunables for a [`crate::Hub`] instance.
///
/// Defaults match the documented protocol limits: 100 requests/minute per
/// connection, 100 members per room, 1000 history entries per room, 50
/// replayed entries on join, 30 s heartbeat pings with a 60 s pong timeout.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Shared auth secret. `None` disables authentication: connections are
    /// admitted directly with a generated pseudo-identity.
    pub shared_secret: Option<String>,
    /// Interval between transport-level pings.
    pub heartbeat_interval: Duration,
    /// A connection with no pong for this long is forcibly terminated.
    pub heartbeat_timeout: Duration,
    /// Requests allowed per connection per rate window.
    pub rate_limit: u32,
    /// Rate-limit window length.
    pub rate_window: Duration,
    /// Maximum members per room.
    pub room_member_cap: usize,
    /// Maximum history entries per room (FIFO eviction).
    pub history_cap: usize,
    /// History entries replayed to a joining connection.
    pub history_replay: usize,
    /// Room that receives history for direct and global sends.
    pub default_room: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            shared_secret: None,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            rate_limit: 100,
            rate_window: Duration::from_secs(60),
            room_member_cap: 100,
            history_cap: 1000,
            history_replay: 50,
            default_room: "general".to_string(),
        }
    }
}

impl HubConfig {
    /// Config requiring the given shared secret for authentication.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            shared_secret: Some(secret.into()),
            ..Self::default()
        }
    }
}
