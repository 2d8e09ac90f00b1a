//! BemTV wire protocol: message types and the timestamp envelope.

use serde::{Deserialize, Serialize};

/// Scoring metrics a node advertises about itself in every heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreParams {
    /// Watch time in seconds.
    pub wt: f64,
    /// Rebuffer time in seconds.
    pub rt: f64,
    /// Segments served to peers.
    pub tps: u64,
    /// URL of the fragment the sender is currently playing.
    pub last_fragment_uri: String,
}

/// All swarm messages. Encoding is bincode inside an [`Envelope`] (see wire module).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Heartbeat: the sender's scoring metrics and playback position.
    Announce(ScoreParams),
    /// "Have you got this segment?" Sent only to peers believed to be ahead.
    RequestAvailability { url: String },
    /// Positive answer to `RequestAvailability`. Nothing is sent when the segment is missing.
    AcknowledgeAvailability { url: String },
    /// Ask an acknowledging peer for the segment bytes.
    RequestContent { url: String },
    /// Segment payload with the length the sender measured.
    DeliverContent {
        url: String,
        content: Vec<u8>,
        length: u64,
    },
}

impl Message {
    /// Short tag for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Announce(_) => "announce",
            Message::RequestAvailability { .. } => "request-availability",
            Message::AcknowledgeAvailability { .. } => "acknowledge-availability",
            Message::RequestContent { .. } => "request-content",
            Message::DeliverContent { .. } => "deliver-content",
        }
    }
}

/// Every message travels with the sender's wall clock in epoch millis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub msg: Message,
    pub sending_time: u64,
}
