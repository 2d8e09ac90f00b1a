//! BemTV swarm protocol: peer-assisted delivery of video segments.
//! Host-driven: no I/O; the host passes transport and player events and carries out the returned actions.

pub mod config;
pub mod core;
pub mod fetch;
pub mod player;
pub mod protocol;
pub mod scoring;
pub mod swarm;
pub mod wire;

pub use config::SwarmConfig;
pub use crate::core::{MessageError, OutboundAction, SwarmCore};
pub use fetch::{DeliveryError, FetchState};
pub use player::{
    Counter, PlaybackPipeline, PlaybackStats, Player, Segment, SegmentCache, SegmentList,
    StatsCollector, StatsCounters,
};
pub use protocol::{Envelope, Message, ScoreParams};
pub use scoring::{PlaceholderScoring, Score, ScoreInput, ScoringPolicy};
pub use swarm::{PeerChannel, PeerId, SwarmRegistry, TransportSendFailure};
pub use wire::{decode, encode, now_millis, MalformedMessage};
