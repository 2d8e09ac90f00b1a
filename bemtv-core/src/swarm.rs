//! Swarm registry: connected peers, their channels and last-known scoring state.

use std::collections::HashMap;
use std::fmt;

use crate::protocol::ScoreParams;
use crate::scoring::Score;

/// Opaque peer identifier, unique per connection. Assigned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        PeerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        PeerId(s)
    }
}

/// Outbound half of a peer connection. Best effort: `Ok` does not mean the peer got it.
pub trait PeerChannel {
    fn send(&mut self, bytes: Vec<u8>) -> Result<(), TransportSendFailure>;
}

#[cfg(test)]
impl PeerChannel for std::sync::mpsc::Sender<Vec<u8>> {
    fn send(&mut self, bytes: Vec<u8>) -> Result<(), TransportSendFailure> {
        std::sync::mpsc::Sender::send(&*self, bytes)
            .map_err(|_| TransportSendFailure::new("channel closed"))
    }
}

/// Transport refused a send. Logged by the core, never retried.
#[derive(Debug, Clone, thiserror::Error)]
#[error("transport send failed: {reason}")]
pub struct TransportSendFailure {
    pub reason: String,
}

impl TransportSendFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// One connected peer.
pub struct Peer<C> {
    pub id: PeerId,
    pub channel: C,
    /// None until the first heartbeat arrives.
    pub score: Option<Score>,
    /// Snapshot of the last heartbeat; replaced wholesale on every heartbeat.
    pub metrics: Option<ScoreParams>,
    /// Peer claims a fragment we have not cached yet. Only ahead peers are asked for segments.
    pub is_ahead: bool,
    /// Round-trip time of the last envelope from this peer, in millis.
    pub rtt: Option<u64>,
}

impl<C> Peer<C> {
    fn new(id: PeerId, channel: C) -> Self {
        Self {
            id,
            channel,
            score: None,
            metrics: None,
            is_ahead: false,
            rtt: None,
        }
    }
}

impl<C> fmt::Debug for Peer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("score", &self.score)
            .field("metrics", &self.metrics)
            .field("is_ahead", &self.is_ahead)
            .field("rtt", &self.rtt)
            .finish()
    }
}

/// Peers currently in the room. Iteration order is unspecified.
pub struct SwarmRegistry<C> {
    peers: HashMap<PeerId, Peer<C>>,
}

impl<C> SwarmRegistry<C> {
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }

    /// Register a peer with unscored defaults. An existing entry with the same id is replaced.
    pub fn add(&mut self, id: PeerId, channel: C) {
        self.peers.insert(id.clone(), Peer::new(id, channel));
    }

    /// Drop a peer and everything known about it. Returns false if it was not registered.
    pub fn remove(&mut self, id: &PeerId) -> bool {
        self.peers.remove(id).is_some()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Peer<C>)) {
        for peer in self.peers.values() {
            f(peer);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer<C>> {
        self.peers.values()
    }

    pub fn get(&self, id: &PeerId) -> Option<&Peer<C>> {
        self.peers.get(id)
    }

    pub fn get_mut(&mut self, id: &PeerId) -> Option<&mut Peer<C>> {
        self.peers.get_mut(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.peers.keys().cloned().collect()
    }

    /// Peer ids by descending score; unscored peers last. Ties broken by id so the order is stable.
    pub fn ranked(&self) -> Vec<PeerId> {
        let mut peers: Vec<&Peer<C>> = self.peers.values().collect();
        peers.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        peers.into_iter().map(|p| p.id.clone()).collect()
    }
}

impl<C> Default for SwarmRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn add_registers_unscored_peer() {
        let mut reg = SwarmRegistry::new();
        reg.add(PeerId::from("x"), ());
        let peer = reg.get(&PeerId::from("x")).unwrap();
        assert!(peer.score.is_none());
        assert!(peer.metrics.is_none());
        assert!(!peer.is_ahead);
    }

    #[test]
    fn add_twice_overwrites() {
        let mut reg = SwarmRegistry::new();
        reg.add(PeerId::from("x"), 1u8);
        reg.get_mut(&PeerId::from("x")).unwrap().score = Some(600);
        reg.add(PeerId::from("x"), 2u8);
        assert_eq!(reg.len(), 1);
        let peer = reg.get(&PeerId::from("x")).unwrap();
        assert_eq!(peer.channel, 2);
        assert!(peer.score.is_none());
    }

    #[test]
    fn remove_twice_is_noop() {
        let mut reg = SwarmRegistry::new();
        reg.add(PeerId::from("x"), ());
        reg.add(PeerId::from("y"), ());
        assert!(reg.remove(&PeerId::from("x")));
        assert!(!reg.remove(&PeerId::from("x")));
        assert_eq!(reg.ids(), vec![PeerId::from("y")]);
    }

    #[test]
    fn ranked_puts_unscored_last() {
        let mut reg = SwarmRegistry::new();
        reg.add(PeerId::from("a"), ());
        reg.add(PeerId::from("b"), ());
        reg.add(PeerId::from("c"), ());
        reg.get_mut(&PeerId::from("b")).unwrap().score = Some(10);
        reg.get_mut(&PeerId::from("c")).unwrap().score = Some(600);
        assert_eq!(
            reg.ranked(),
            vec![PeerId::from("c"), PeerId::from("b"), PeerId::from("a")]
        );
    }

    #[test]
    fn mpsc_sender_reports_closed_channel() {
        let (mut tx, rx) = std::sync::mpsc::channel::<Vec<u8>>();
        assert!(PeerChannel::send(&mut tx, vec![1]).is_ok());
        assert_eq!(rx.recv().unwrap(), vec![1]);
        drop(rx);
        assert!(PeerChannel::send(&mut tx, vec![2]).is_err());
    }

    #[derive(Debug, Clone)]
    enum Event {
        Join(u8),
        Leave(u8),
    }

    fn event() -> impl Strategy<Value = Event> {
        prop_oneof![
            (0u8..8).prop_map(Event::Join),
            (0u8..8).prop_map(Event::Leave),
        ]
    }

    proptest! {
        #[test]
        fn membership_tracks_joined_not_left(events in proptest::collection::vec(event(), 0..64)) {
            let mut reg = SwarmRegistry::new();
            let mut model = HashSet::new();
            for ev in &events {
                match ev {
                    Event::Join(n) => {
                        reg.add(PeerId::new(n.to_string()), ());
                        model.insert(n.to_string());
                    }
                    Event::Leave(n) => {
                        reg.remove(&PeerId::new(n.to_string()));
                        model.remove(&n.to_string());
                    }
                }
            }
            let actual: HashSet<String> = reg.ids().into_iter().map(|p| p.as_str().to_string()).collect();
            prop_assert_eq!(actual, model);
        }
    }
}
