//! Node state behind one mutex: the swarm core plus the player collaborators it drives.

use std::sync::Arc;
use std::time::Instant;

use bemtv_core::{
    PeerChannel, PlaybackPipeline, Player, SegmentList, StatsCounters, SwarmConfig, SwarmCore,
    TransportSendFailure,
};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Outbound queue of one peer connection; the connection's writer task drains it.
#[derive(Debug, Clone)]
pub struct PeerSender(pub mpsc::UnboundedSender<Vec<u8>>);

impl PeerChannel for PeerSender {
    fn send(&mut self, bytes: Vec<u8>) -> Result<(), TransportSendFailure> {
        self.0
            .send(bytes)
            .map_err(|_| TransportSendFailure::new("connection closed"))
    }
}

/// Playback stand-in: remembers what was requested and what arrived.
#[derive(Debug, Default)]
pub struct Playback {
    /// Segment the driver is currently waiting for.
    pub requested: Option<String>,
    pub last_fragment: String,
    pub loaded_segments: u64,
    pub loaded_bytes: u64,
    /// Set when the first segment arrives; watch time counts from here.
    pub started: Option<Instant>,
}

impl PlaybackPipeline for Playback {
    fn resource_loaded(&mut self, data: &[u8]) {
        if let Some(url) = &self.requested {
            self.last_fragment = url.clone();
        }
        self.loaded_segments += 1;
        self.loaded_bytes += data.len() as u64;
        self.started.get_or_insert_with(Instant::now);
        debug!(size = data.len(), "segment handed to playback");
    }

    fn last_fragment_url(&self) -> String {
        self.last_fragment.clone()
    }
}

pub struct NodeState {
    pub core: SwarmCore<PeerSender>,
    pub cache: SegmentList,
    pub stats: StatsCounters,
    pub playback: Playback,
}

pub type SharedState = Arc<Mutex<NodeState>>;

impl NodeState {
    pub fn new(config: SwarmConfig) -> Self {
        Self {
            core: SwarmCore::new(config),
            cache: SegmentList::new(),
            stats: StatsCounters::default(),
            playback: Playback::default(),
        }
    }

    /// Borrow the core and the player view at the same time.
    pub fn split(&mut self) -> (&mut SwarmCore<PeerSender>, Player<'_>) {
        (
            &mut self.core,
            Player {
                cache: &mut self.cache,
                stats: &mut self.stats,
                playback: &mut self.playback,
            },
        )
    }

    /// Refresh watch time from the playback clock.
    pub fn update_watch_time(&mut self) {
        if let Some(started) = self.playback.started {
            self.stats.stats.watching_time = started.elapsed().as_secs_f64();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loaded_segment_becomes_last_fragment() {
        let mut p = Playback::default();
        assert_eq!(p.last_fragment_url(), "");
        p.requested = Some("seg1.ts".to_string());
        p.resource_loaded(&[0; 10]);
        assert_eq!(p.last_fragment_url(), "seg1.ts");
        assert_eq!(p.loaded_bytes, 10);
        assert!(p.started.is_some());
    }

    #[test]
    fn closed_connection_is_send_failure() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sender = PeerSender(tx);
        assert!(sender.send(vec![1]).is_ok());
        drop(rx);
        assert!(sender.send(vec![2]).is_err());
    }

    #[test]
    fn watch_time_stays_zero_before_playback() {
        let mut s = NodeState::new(SwarmConfig::default());
        s.update_watch_time();
        assert_eq!(s.stats.stats.watching_time, 0.0);
    }
}
