//! Playback driver: walk the playlist, one segment at a time, peers first and origin on fallback.

use std::time::Duration;

use bemtv_core::wire::now_millis;
use bemtv_core::{OutboundAction, PlaybackPipeline, SegmentCache};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::origin;
use crate::state::SharedState;

const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Drive the core's timers: fire fallbacks, flush heartbeats, refresh watch time.
pub async fn run_ticker(state: SharedState, actions: mpsc::UnboundedSender<OutboundAction>) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    loop {
        interval.tick().await;
        let mut st = state.lock().await;
        st.update_watch_time();
        let (core, mut player) = st.split();
        for action in core.tick(&mut player, now_millis()) {
            let _ = actions.send(action);
        }
    }
}

/// Load every URL in order, then report a full buffer so peers get our heartbeat.
pub async fn play(
    state: SharedState,
    client: reqwest::Client,
    playlist: Vec<String>,
    mut actions: mpsc::UnboundedReceiver<OutboundAction>,
) {
    let (mut from_peers, mut from_origin) = (0u32, 0u32);
    for url in &playlist {
        {
            let mut st = state.lock().await;
            st.playback.requested = Some(url.clone());
            let now = now_millis();
            let deadline = now + st.core.config().fallback_timeout_ms();
            for action in st.core.request_resource(url, deadline, now) {
                if let OutboundAction::FetchFromOrigin(old) = action {
                    info!(url = %old, "request superseded, loading it from origin");
                    let (state, client) = (state.clone(), client.clone());
                    tokio::spawn(async move {
                        load_from_origin(&state, &client, &old).await;
                    });
                }
            }
        }
        loop {
            match actions.recv().await {
                Some(OutboundAction::SegmentLoaded { url: loaded, peer }) if &loaded == url => {
                    info!(url = %loaded, peer = %peer, "loaded from peer");
                    from_peers += 1;
                    break;
                }
                Some(OutboundAction::FetchFromOrigin(fallback)) if &fallback == url => {
                    if load_from_origin(&state, &client, url).await {
                        from_origin += 1;
                    }
                    break;
                }
                Some(other) => info!(?other, "ignoring action for another segment"),
                None => return,
            }
        }
    }
    info!(from_peers, from_origin, "playlist done, buffer full");
    let mut st = state.lock().await;
    st.playback.requested = None;
    st.core.on_buffer_full(now_millis());
}

async fn load_from_origin(state: &SharedState, client: &reqwest::Client, url: &str) -> bool {
    match origin::fetch_segment(client, url).await {
        Ok(bytes) => {
            let mut st = state.lock().await;
            st.playback.resource_loaded(&bytes);
            st.cache.append(url.to_string(), bytes);
            info!(url, "loaded from origin");
            true
        }
        Err(e) => {
            warn!(url, "origin fetch failed: {:#}", e);
            false
        }
    }
}
