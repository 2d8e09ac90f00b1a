//! Player-side collaborators: segment cache, stats collector, playback pipeline.
//! The core consumes these through traits; in-memory implementations are provided for hosts and tests.

/// A media segment addressed by URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub url: String,
    pub data: Vec<u8>,
}

/// Ordered, append-only store of locally available segments.
pub trait SegmentCache {
    /// Bytes of the first segment whose URL equals `url`.
    fn find(&self, url: &str) -> Option<&[u8]>;
    fn append(&mut self, url: String, data: Vec<u8>);

    fn contains(&self, url: &str) -> bool {
        self.find(url).is_some()
    }
}

/// Segments in arrival order; lookups are a linear scan by URL.
#[derive(Debug, Default, Clone)]
pub struct SegmentList {
    segments: Vec<Segment>,
}

impl SegmentList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl SegmentCache for SegmentList {
    fn find(&self, url: &str) -> Option<&[u8]> {
        self.segments
            .iter()
            .find(|s| s.url == url)
            .map(|s| s.data.as_slice())
    }

    fn append(&mut self, url: String, data: Vec<u8>) {
        self.segments.push(Segment { url, data });
    }
}

/// Counters the core bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Segments this node delivered to peers.
    ChunksSent,
    /// Segments this node received from peers.
    ChunksReceivedP2P,
}

/// Snapshot of playback statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackStats {
    /// Seconds of content watched.
    pub watching_time: f64,
    /// Seconds spent rebuffering.
    pub rebuffering_time: f64,
    pub chunks_sent: u64,
    pub chunks_received_p2p: u64,
}

pub trait StatsCollector {
    fn get(&self) -> PlaybackStats;
    fn increment(&mut self, counter: Counter, delta: u64);
}

/// Plain in-memory stats. Hosts update the timing fields directly.
#[derive(Debug, Default, Clone)]
pub struct StatsCounters {
    pub stats: PlaybackStats,
}

impl StatsCollector for StatsCounters {
    fn get(&self) -> PlaybackStats {
        self.stats
    }

    fn increment(&mut self, counter: Counter, delta: u64) {
        match counter {
            Counter::ChunksSent => self.stats.chunks_sent += delta,
            Counter::ChunksReceivedP2P => self.stats.chunks_received_p2p += delta,
        }
    }
}

/// The player's media pipeline.
pub trait PlaybackPipeline {
    /// Hand off a segment that arrived from a peer.
    fn resource_loaded(&mut self, data: &[u8]);
    fn last_fragment_url(&self) -> String;
}

/// Borrowed view of the player collaborators, passed into every core event.
pub struct Player<'a> {
    pub cache: &'a mut dyn SegmentCache,
    pub stats: &'a mut dyn StatsCollector,
    pub playback: &'a mut dyn PlaybackPipeline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_returns_first_match() {
        let mut cache = SegmentList::new();
        cache.append("a.ts".to_string(), vec![1]);
        cache.append("b.ts".to_string(), vec![2]);
        cache.append("a.ts".to_string(), vec![3]);
        assert_eq!(cache.find("a.ts"), Some(&[1u8][..]));
        assert_eq!(cache.find("b.ts"), Some(&[2u8][..]));
        assert!(cache.find("c.ts").is_none());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn counters_increment_independently() {
        let mut stats = StatsCounters::default();
        stats.increment(Counter::ChunksSent, 2);
        stats.increment(Counter::ChunksReceivedP2P, 1);
        stats.increment(Counter::ChunksSent, 1);
        let s = stats.get();
        assert_eq!(s.chunks_sent, 3);
        assert_eq!(s.chunks_received_p2p, 1);
    }
}
