//! Peer transport: TCP server (incoming), TCP client (outbound to configured peers),
//! room handshake, then length-prefixed envelope frames in both directions.

use std::time::Duration;

use bemtv_core::wire::{encode_frame, now_millis, LEN_SIZE, MAX_FRAME_LEN};
use bemtv_core::{OutboundAction, PeerId};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::{PeerSender, SharedState};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const REDIAL_INTERVAL: Duration = Duration::from_secs(2);

/// First frame on every connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Hello {
    room: String,
    node_id: String,
}

/// Everything a connection needs besides its socket.
#[derive(Clone)]
pub struct TransportContext {
    pub state: SharedState,
    pub room: String,
    pub node_id: String,
    pub actions: mpsc::UnboundedSender<OutboundAction>,
}

/// Run transport: accept incoming connections and keep dialing each configured peer address.
pub async fn run_transport(
    ctx: TransportContext,
    listen_port: u16,
    peers: Vec<String>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", listen_port)).await?;
    info!(port = listen_port, room = %ctx.room, "transport listening");

    for addr in peers {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            loop {
                match TcpStream::connect(&addr).await {
                    Ok(stream) => {
                        if let Err(e) = serve(stream, ctx.clone()).await {
                            debug!(addr = %addr, "connection ended: {}", e);
                        }
                    }
                    Err(e) => debug!(addr = %addr, "dial failed: {}", e),
                }
                tokio::time::sleep(REDIAL_INTERVAL).await;
            }
        });
    }

    loop {
        let (stream, from) = listener.accept().await?;
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = serve(stream, ctx).await {
                debug!(from = %from, "connection ended: {}", e);
            }
        });
    }
}

async fn serve(mut stream: TcpStream, ctx: TransportContext) -> std::io::Result<()> {
    let peer_id = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut stream, &ctx))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "handshake timed out"))??;
    run_connection(stream, peer_id, ctx).await;
    Ok(())
}

/// Exchange hellos. Peers from another room, or ourselves, are refused.
async fn handshake(stream: &mut TcpStream, ctx: &TransportContext) -> std::io::Result<PeerId> {
    let hello = Hello {
        room: ctx.room.clone(),
        node_id: ctx.node_id.clone(),
    };
    let bytes = serde_json::to_vec(&hello)?;
    write_frame(stream, &bytes).await?;
    let theirs: Hello = serde_json::from_slice(&read_frame(stream).await?)?;
    if theirs.room != ctx.room {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("peer is in room {}", theirs.room),
        ));
    }
    if theirs.node_id == ctx.node_id {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "connected to self",
        ));
    }
    Ok(PeerId::new(theirs.node_id))
}

async fn run_connection(stream: TcpStream, peer_id: PeerId, ctx: TransportContext) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    {
        let mut st = ctx.state.lock().await;
        let (core, mut player) = st.split();
        core.on_peer_joined(&mut player, peer_id.clone(), PeerSender(tx.clone()), now_millis());
    }

    let (mut reader, mut writer) = stream.into_split();
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if write_frame(&mut writer, &payload).await.is_err() {
                break;
            }
        }
    });

    loop {
        let payload = match read_frame(&mut reader).await {
            Ok(p) => p,
            Err(_) => break,
        };
        let mut st = ctx.state.lock().await;
        let (core, mut player) = st.split();
        match core.on_message_received(&mut player, &peer_id, &payload, now_millis()) {
            Ok(actions) => {
                for action in actions {
                    let _ = ctx.actions.send(action);
                }
            }
            Err(e) => warn!(peer = %peer_id, "dropping message: {}", e),
        }
    }

    // A newer connection from the same peer may have replaced ours in the registry.
    let mut st = ctx.state.lock().await;
    let ours = st
        .core
        .registry()
        .get(&peer_id)
        .map(|p| p.channel.0.same_channel(&tx))
        .unwrap_or(false);
    if ours {
        st.core.on_peer_left(&peer_id);
    }
}

/// Write one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, payload: &[u8]) -> std::io::Result<()> {
    let frame = encode_frame(payload)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    w.write_all(&frame).await?;
    w.flush().await
}

/// Read one length-prefixed frame.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; LEN_SIZE];
    r.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "frame too large",
        ));
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload).await?;
    Ok(payload)
}
