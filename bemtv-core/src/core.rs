//! Host-driven API: SwarmCore receives transport and player events, performs sends through
//! each peer's channel, and returns the actions the host must carry out.

use tracing::{debug, info, warn};

use crate::config::SwarmConfig;
use crate::fetch::{DeliveryError, FetchCoordinator, FetchState};
use crate::player::{Counter, Player};
use crate::protocol::Message;
use crate::scoring::{self, PlaceholderScoring, ScoringPolicy};
use crate::swarm::{PeerChannel, PeerId, SwarmRegistry};
use crate::wire::{self, MalformedMessage};

/// Main coordinator. One per node; a multi-threaded host wraps it in a single mutex.
pub struct SwarmCore<C> {
    config: SwarmConfig,
    registry: SwarmRegistry<C>,
    fetch: FetchCoordinator,
    scoring: Box<dyn ScoringPolicy + Send>,
    /// Heartbeats waiting for their send time: (due epoch millis, peer).
    scheduled_heartbeats: Vec<(u64, PeerId)>,
}

impl<C: PeerChannel> SwarmCore<C> {
    pub fn new(config: SwarmConfig) -> Self {
        Self::with_scoring(config, PlaceholderScoring)
    }

    pub fn with_scoring(config: SwarmConfig, scoring: impl ScoringPolicy + Send + 'static) -> Self {
        Self {
            config,
            registry: SwarmRegistry::new(),
            fetch: FetchCoordinator::new(),
            scoring: Box::new(scoring),
            scheduled_heartbeats: Vec::new(),
        }
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn registry(&self) -> &SwarmRegistry<C> {
        &self.registry
    }

    pub fn fetch_state(&self) -> FetchState {
        self.fetch.state()
    }

    pub fn current_url(&self) -> Option<&str> {
        self.fetch.current_url()
    }

    /// Deadline of the armed fallback timer, for hosts that sleep until it instead of ticking.
    pub fn fallback_deadline(&self) -> Option<u64> {
        self.fetch.deadline()
    }

    /// Peer joined the room. Seeds its scoring with a heartbeat once we have watched anything.
    pub fn on_peer_joined(&mut self, player: &mut Player<'_>, peer_id: PeerId, channel: C, now: u64) {
        info!(peer = %peer_id, "peer joined");
        self.registry.add(peer_id.clone(), channel);
        if player.stats.get().watching_time > 0.0 {
            self.send_heartbeat(player, &peer_id, now);
        }
    }

    /// Peer left or its transport failed.
    pub fn on_peer_left(&mut self, peer_id: &PeerId) {
        if self.registry.remove(peer_id) {
            info!(peer = %peer_id, "peer disconnected");
        }
        self.scheduled_heartbeats.retain(|(_, p)| p != peer_id);
    }

    /// Local playback buffer is full: every current peer gets a heartbeat after the configured delay.
    pub fn on_buffer_full(&mut self, now: u64) {
        let due = now.saturating_add(self.config.heartbeat_delay_ms());
        for id in self.registry.ids() {
            self.scheduled_heartbeats.push((due, id));
        }
    }

    /// Ask ahead peers for `url` and arm the fallback for `deadline`.
    /// A different request still outstanding is abandoned and handed back as a fallback.
    pub fn request_resource(&mut self, url: &str, deadline: u64, now: u64) -> Vec<OutboundAction> {
        let mut actions = Vec::new();
        if let Some(abandoned) = self.fetch.begin(url, deadline) {
            actions.push(OutboundAction::FetchFromOrigin(abandoned));
        }
        for id in self.registry.ranked() {
            let ahead = self.registry.get(&id).map(|p| p.is_ahead).unwrap_or(false);
            if !ahead {
                debug!(peer = %id, "peer is behind, skipping");
                continue;
            }
            debug!(peer = %id, url, "peer is ahead, asking for segment");
            let msg = Message::RequestAvailability {
                url: url.to_string(),
            };
            if self.send(&id, &msg, now) {
                self.fetch.record_queried(id);
            }
        }
        actions
    }

    /// Process one inbound payload from `peer_id`.
    pub fn on_message_received(
        &mut self,
        player: &mut Player<'_>,
        peer_id: &PeerId,
        bytes: &[u8],
        now: u64,
    ) -> Result<Vec<OutboundAction>, MessageError> {
        let (msg, sending_time) = wire::decode(bytes)?;
        let rtt = wire::round_trip_time(now, sending_time);
        debug!(peer = %peer_id, kind = msg.kind(), rtt, "message received");

        let mut actions = Vec::new();
        match msg {
            Message::Announce(params) => match self.registry.get_mut(peer_id) {
                Some(peer) => {
                    scoring::apply_heartbeat(
                        peer,
                        params,
                        rtt,
                        self.scoring.as_ref(),
                        &*player.cache,
                    );
                }
                None => debug!(peer = %peer_id, "heartbeat from unknown peer dropped"),
            },
            Message::RequestAvailability { url } => {
                if player.cache.contains(&url) {
                    self.send(peer_id, &Message::AcknowledgeAvailability { url }, now);
                }
            }
            Message::AcknowledgeAvailability { url } => {
                if self.fetch.on_acknowledge(&url) {
                    self.send(peer_id, &Message::RequestContent { url }, now);
                }
            }
            Message::RequestContent { url } => {
                if let Some(data) = player.cache.find(&url) {
                    let content = data.to_vec();
                    info!(peer = %peer_id, url = %url, size = content.len(), "serving segment");
                    let length = content.len() as u64;
                    self.send(
                        peer_id,
                        &Message::DeliverContent {
                            url,
                            content,
                            length,
                        },
                        now,
                    );
                    player.stats.increment(Counter::ChunksSent, 1);
                }
            }
            Message::DeliverContent {
                url,
                content,
                length,
            } => match self.fetch.accept_delivery(&url, &content, length) {
                Ok(()) => {
                    info!(peer = %peer_id, url = %url, "segment from P2P");
                    player.playback.resource_loaded(&content);
                    player.cache.append(url.clone(), content);
                    player.stats.increment(Counter::ChunksReceivedP2P, 1);
                    actions.push(OutboundAction::SegmentLoaded {
                        url,
                        peer: peer_id.clone(),
                    });
                }
                Err(DeliveryError::NotRequested { url }) => {
                    debug!(peer = %peer_id, url = %url, "unrequested content dropped");
                }
                Err(e @ DeliveryError::ContentLengthMismatch { .. }) => {
                    warn!(peer = %peer_id, "{}", e);
                }
            },
        }
        Ok(actions)
    }

    /// Periodic tick: fire an expired fallback and flush due heartbeats.
    pub fn tick(&mut self, player: &mut Player<'_>, now: u64) -> Vec<OutboundAction> {
        let mut actions = Vec::new();
        if let Some(fallen) = self.fetch.poll_timer(now) {
            info!(url = %fallen.url, "no peer delivered in time, falling back to origin");
            actions.push(OutboundAction::FetchFromOrigin(fallen.url));
        }

        let (due, later): (Vec<_>, Vec<_>) = self
            .scheduled_heartbeats
            .drain(..)
            .partition(|(at, _)| *at <= now);
        self.scheduled_heartbeats = later;
        for (_, peer_id) in due {
            self.send_heartbeat(player, &peer_id, now);
        }
        actions
    }

    fn send_heartbeat(&mut self, player: &Player<'_>, peer_id: &PeerId, now: u64) {
        let params = scoring::local_score_params(&*player.stats, &*player.playback);
        self.send(peer_id, &Message::Announce(params), now);
    }

    /// Encode and hand to the peer's channel. Failures are logged, never retried.
    fn send(&mut self, peer_id: &PeerId, msg: &Message, now: u64) -> bool {
        let Some(peer) = self.registry.get_mut(peer_id) else {
            warn!(peer = %peer_id, kind = msg.kind(), "error sending to unknown peer");
            return false;
        };
        let bytes = match wire::encode(msg, now) {
            Ok(b) => b,
            Err(e) => {
                warn!(peer = %peer_id, kind = msg.kind(), "encode failed: {}", e);
                return false;
            }
        };
        match peer.channel.send(bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!(peer = %peer_id, kind = msg.kind(), "{}", e);
                false
            }
        }
    }
}

impl<C: PeerChannel> Default for SwarmCore<C> {
    fn default() -> Self {
        Self::new(SwarmConfig::default())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error(transparent)]
    Malformed(#[from] MalformedMessage),
}

/// Action for host to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    /// Peers did not deliver in time (or the request was superseded); fetch from the origin.
    FetchFromOrigin(String),
    /// A peer delivered the segment; it is already in the cache and handed to playback.
    SegmentLoaded { url: String, peer: PeerId },
}
