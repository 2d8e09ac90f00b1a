//! Peer scoring: heartbeat metrics in, priority score and ahead/behind flag out.

use tracing::debug;

use crate::player::{PlaybackPipeline, SegmentCache, StatsCollector};
use crate::protocol::ScoreParams;
use crate::swarm::Peer;

/// Peer priority. Higher is better.
pub type Score = u32;

/// Value returned by [`PlaceholderScoring`] for every peer.
pub const PLACEHOLDER_SCORE: Score = 600;

/// Everything a scoring policy may look at.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput<'a> {
    pub rtt: u64,
    pub params: &'a ScoreParams,
}

/// Maps a peer's latest metrics to a score. Swap implementations without touching the fetch logic.
pub trait ScoringPolicy {
    fn score(&self, input: &ScoreInput<'_>) -> Score;
}

impl<F> ScoringPolicy for F
where
    F: Fn(&ScoreInput<'_>) -> Score,
{
    fn score(&self, input: &ScoreInput<'_>) -> Score {
        self(input)
    }
}

/// Constant score. No real formula has been settled on yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderScoring;

impl ScoringPolicy for PlaceholderScoring {
    fn score(&self, input: &ScoreInput<'_>) -> Score {
        debug!(
            rtt = input.rtt,
            wt = input.params.wt,
            rt = input.params.rt,
            tps = input.params.tps,
            "placeholder score"
        );
        PLACEHOLDER_SCORE
    }
}

/// A peer is ahead when the fragment it reports playing is not in our cache.
pub fn is_ahead(cache: &dyn SegmentCache, last_fragment_uri: &str) -> bool {
    !cache.contains(last_fragment_uri)
}

/// Fold a heartbeat into the peer record: replace metrics, rescore, reclassify.
pub fn apply_heartbeat<C>(
    peer: &mut Peer<C>,
    params: ScoreParams,
    rtt: u64,
    policy: &dyn ScoringPolicy,
    cache: &dyn SegmentCache,
) {
    peer.score = Some(policy.score(&ScoreInput {
        rtt,
        params: &params,
    }));
    peer.is_ahead = is_ahead(cache, &params.last_fragment_uri);
    peer.rtt = Some(rtt);
    peer.metrics = Some(params);
}

/// Metrics this node advertises, read fresh from the player.
pub fn local_score_params(
    stats: &dyn StatsCollector,
    playback: &dyn PlaybackPipeline,
) -> ScoreParams {
    let s = stats.get();
    ScoreParams {
        wt: s.watching_time,
        rt: s.rebuffering_time,
        tps: s.chunks_sent,
        last_fragment_uri: playback.last_fragment_url(),
    }
}
