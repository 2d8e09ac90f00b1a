//! Room discovery: ask the discovery endpoint which room to join.

use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct RoomResponse {
    room: String,
}

/// Room name from a discovery response body, if it has one.
pub fn parse_room(body: &str) -> Option<String> {
    serde_json::from_str::<RoomResponse>(body)
        .ok()
        .map(|r| r.room)
        .filter(|r| !r.is_empty())
}

/// GET the discovery URL. Any failure lands the node in `default_room`.
pub async fn discover_room(client: &reqwest::Client, url: &str, default_room: &str) -> String {
    let body = match client.get(url).send().await {
        Ok(resp) => match resp.error_for_status() {
            Ok(resp) => resp.text().await.ok(),
            Err(e) => {
                warn!("room discovery failed: {}", e);
                None
            }
        },
        Err(e) => {
            warn!("room discovery unreachable: {}", e);
            None
        }
    };
    let room = body
        .as_deref()
        .and_then(parse_room)
        .unwrap_or_else(|| default_room.to_string());
    info!(room = %room, "joined room");
    room
}
