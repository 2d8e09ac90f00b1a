//! Swarm configuration passed into the core at construction.

use std::time::Duration;

/// Default room discovery endpoint. Returns `{"room": "<name>"}`.
pub const DEFAULT_ROOM_DISCOVERY_URL: &str = "http://server.bem.tv/room";

/// Default signaling endpoint used by the transport to meet peers.
pub const DEFAULT_SIGNALING_URL: &str = "http://server.bem.tv:8080";

/// Room joined when discovery fails.
pub const DEFAULT_ROOM: &str = "bemtv";

/// Delay before each peer gets a heartbeat after the local buffer fills.
pub const DEFAULT_HEARTBEAT_DELAY: Duration = Duration::from_secs(2);

/// Default time a segment request waits for peers before falling back to the origin.
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_millis(5000);

/// Core configuration. Hosts build it from their own config layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmConfig {
    pub room_discovery_url: String,
    pub signaling_url: String,
    pub default_room: String,
    /// Fixed delay applied to every heartbeat sent on buffer full.
    pub heartbeat_delay: Duration,
    /// Deadline offset hosts use when calling `request_resource`.
    pub fallback_timeout: Duration,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            room_discovery_url: DEFAULT_ROOM_DISCOVERY_URL.to_string(),
            signaling_url: DEFAULT_SIGNALING_URL.to_string(),
            default_room: DEFAULT_ROOM.to_string(),
            heartbeat_delay: DEFAULT_HEARTBEAT_DELAY,
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
        }
    }
}

impl SwarmConfig {
    pub fn heartbeat_delay_ms(&self) -> u64 {
        self.heartbeat_delay.as_millis() as u64
    }

    pub fn fallback_timeout_ms(&self) -> u64 {
        self.fallback_timeout.as_millis() as u64
    }
}
