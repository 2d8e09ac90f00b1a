//! Fetch coordinator: the per-segment retrieval state machine and its fallback timer.
//!
//! Only one segment is outstanding at a time. The coordinator decides; the core performs
//! the sends, cache writes and counter updates around it.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::swarm::PeerId;

/// Where the outstanding request stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    /// No outstanding request.
    Idle,
    /// Availability queries sent, no acknowledgment yet.
    Querying,
    /// At least one peer acknowledged and was asked for content.
    AwaitingContent,
    /// Deadline passed; the host fetches from the origin.
    FallenBack,
}

/// Single cancelable deadline in epoch millis. Cancel is idempotent.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackTimer {
    deadline: u64,
    armed: bool,
}

impl FallbackTimer {
    pub fn arm(&mut self, deadline: u64) {
        self.deadline = deadline;
        self.armed = true;
    }

    pub fn cancel(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn deadline(&self) -> Option<u64> {
        self.armed.then_some(self.deadline)
    }

    /// True once `now` reaches the deadline while armed.
    pub fn expired(&self, now: u64) -> bool {
        self.armed && now >= self.deadline
    }
}

/// The one outstanding segment request.
#[derive(Debug, Clone)]
pub struct PendingFetch {
    pub url: String,
    /// Peers sent `RequestAvailability` for this URL.
    pub queried: HashSet<PeerId>,
    pub phase: FetchState,
    timer: FallbackTimer,
}

impl PendingFetch {
    pub fn timer(&self) -> &FallbackTimer {
        &self.timer
    }
}

/// Why a `DeliverContent` was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Nothing outstanding for this URL (never asked, already delivered, or superseded).
    #[error("no outstanding request for {url}")]
    NotRequested { url: String },
    /// Declared length disagrees with the bytes that arrived.
    #[error("content length mismatch for {url}: declared {declared}, got {actual}")]
    ContentLengthMismatch {
        url: String,
        declared: u64,
        actual: u64,
    },
}

#[derive(Debug, Default)]
pub struct FetchCoordinator {
    pending: Option<PendingFetch>,
}

impl FetchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FetchState {
        self.pending
            .as_ref()
            .map(|p| p.phase)
            .unwrap_or(FetchState::Idle)
    }

    pub fn current_url(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.url.as_str())
    }

    pub fn pending(&self) -> Option<&PendingFetch> {
        self.pending.as_ref()
    }

    /// Deadline of the armed fallback timer, if any.
    pub fn deadline(&self) -> Option<u64> {
        self.pending.as_ref().and_then(|p| p.timer.deadline())
    }

    /// Start querying for `url` with a fallback at `deadline`.
    /// Returns the URL of a different request this one supersedes.
    pub fn begin(&mut self, url: &str, deadline: u64) -> Option<String> {
        let abandoned = match self.pending.take() {
            Some(mut old) if old.url != url => {
                old.timer.cancel();
                info!(old = %old.url, new = %url, "request superseded");
                Some(old.url)
            }
            _ => None,
        };
        let mut timer = FallbackTimer::default();
        timer.arm(deadline);
        self.pending = Some(PendingFetch {
            url: url.to_string(),
            queried: HashSet::new(),
            phase: FetchState::Querying,
            timer,
        });
        abandoned
    }

    pub fn record_queried(&mut self, peer: PeerId) {
        if let Some(p) = &mut self.pending {
            p.queried.insert(peer);
        }
    }

    /// A peer says it holds `url`. Returns true if content should be requested from it.
    /// Every matching acknowledgment qualifies; there is no winner selection.
    pub fn on_acknowledge(&mut self, url: &str) -> bool {
        match &mut self.pending {
            Some(p) if p.url == url => {
                p.phase = FetchState::AwaitingContent;
                true
            }
            _ => false,
        }
    }

    /// Validate delivered content. On success the timer is canceled and the coordinator is idle.
    pub fn accept_delivery(
        &mut self,
        url: &str,
        content: &[u8],
        declared: u64,
    ) -> Result<(), DeliveryError> {
        let pending = match &mut self.pending {
            Some(p) if p.url == url => p,
            _ => {
                return Err(DeliveryError::NotRequested {
                    url: url.to_string(),
                })
            }
        };
        let actual = content.len() as u64;
        if actual != declared {
            return Err(DeliveryError::ContentLengthMismatch {
                url: url.to_string(),
                declared,
                actual,
            });
        }
        pending.timer.cancel();
        self.pending = None;
        Ok(())
    }

    /// Fire the fallback if its deadline has passed. Returns the fallen-back request; the
    /// coordinator is idle afterwards.
    pub fn poll_timer(&mut self, now: u64) -> Option<PendingFetch> {
        let expired = self
            .pending
            .as_ref()
            .map(|p| p.timer.expired(now))
            .unwrap_or(false);
        if !expired {
            return None;
        }
        let mut fallen = self.pending.take()?;
        fallen.timer.cancel();
        fallen.phase = FetchState::FallenBack;
        debug!(url = %fallen.url, queried = fallen.queried.len(), "fallback deadline reached");
        Some(fallen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_enters_querying() {
        let mut f = FetchCoordinator::new();
        assert_eq!(f.state(), FetchState::Idle);
        assert!(f.begin("seg1.ts", 5000).is_none());
        assert_eq!(f.state(), FetchState::Querying);
        assert_eq!(f.current_url(), Some("seg1.ts"));
        assert_eq!(f.deadline(), Some(5000));
    }

    #[test]
    fn acknowledge_only_for_current_url() {
        let mut f = FetchCoordinator::new();
        f.begin("seg1.ts", 5000);
        assert!(!f.on_acknowledge("seg0.ts"));
        assert_eq!(f.state(), FetchState::Querying);
        assert!(f.on_acknowledge("seg1.ts"));
        assert!(f.on_acknowledge("seg1.ts"));
        assert_eq!(f.state(), FetchState::AwaitingContent);
    }

    #[test]
    fn matching_delivery_goes_idle() {
        let mut f = FetchCoordinator::new();
        f.begin("seg1.ts", 5000);
        f.on_acknowledge("seg1.ts");
        assert!(f.accept_delivery("seg1.ts", &[1, 2, 3], 3).is_ok());
        assert_eq!(f.state(), FetchState::Idle);
        assert!(f.poll_timer(10_000).is_none());
    }

    #[test]
    fn mismatched_delivery_keeps_waiting() {
        let mut f = FetchCoordinator::new();
        f.begin("seg1.ts", 5000);
        let err = f.accept_delivery("seg1.ts", &[0; 90], 100).unwrap_err();
        assert_eq!(
            err,
            DeliveryError::ContentLengthMismatch {
                url: "seg1.ts".to_string(),
                declared: 100,
                actual: 90
            }
        );
        assert_eq!(f.state(), FetchState::Querying);
        assert_eq!(f.deadline(), Some(5000));
    }

    #[test]
    fn timer_fires_once() {
        let mut f = FetchCoordinator::new();
        f.begin("seg1.ts", 5000);
        assert!(f.poll_timer(4999).is_none());
        let fallen = f.poll_timer(5000).unwrap();
        assert_eq!(fallen.url, "seg1.ts");
        assert_eq!(fallen.phase, FetchState::FallenBack);
        assert!(!fallen.timer().is_armed());
        assert_eq!(f.state(), FetchState::Idle);
        assert!(f.poll_timer(6000).is_none());
    }

    #[test]
    fn late_delivery_after_fallback_is_inert() {
        let mut f = FetchCoordinator::new();
        f.begin("seg1.ts", 5000);
        f.poll_timer(5000);
        assert!(matches!(
            f.accept_delivery("seg1.ts", &[1], 1),
            Err(DeliveryError::NotRequested { .. })
        ));
    }

    #[test]
    fn new_url_supersedes_old() {
        let mut f = FetchCoordinator::new();
        f.begin("seg1.ts", 5000);
        assert_eq!(f.begin("seg2.ts", 6000), Some("seg1.ts".to_string()));
        assert!(matches!(
            f.accept_delivery("seg1.ts", &[1], 1),
            Err(DeliveryError::NotRequested { .. })
        ));
        assert_eq!(f.current_url(), Some("seg2.ts"));
    }

    #[test]
    fn same_url_rearms_timer() {
        let mut f = FetchCoordinator::new();
        f.begin("seg1.ts", 5000);
        assert!(f.begin("seg1.ts", 8000).is_none());
        assert!(f.poll_timer(5000).is_none());
        assert!(f.poll_timer(8000).is_some());
    }

    #[test]
    fn cancel_twice_is_noop() {
        let mut t = FallbackTimer::default();
        t.arm(10);
        t.cancel();
        t.cancel();
        assert!(!t.is_armed());
        assert!(!t.expired(100));
        assert_eq!(t.deadline(), None);
    }
}
