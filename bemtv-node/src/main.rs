// BemTV node: room discovery, peer transport, origin fallback and playlist driver.

mod config;
mod driver;
mod origin;
mod room;
mod state;
mod transport;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

struct Args {
    config: Option<PathBuf>,
    playlist: Vec<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Option<Args>> {
    let mut out = Args {
        config: None,
        playlist: Vec::new(),
    };
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--version" | "-V" => return Ok(None),
            "--config" | "-c" => {
                let path = it.next().context("--config needs a path")?;
                out.config = Some(PathBuf::from(path));
            }
            _ => out.playlist.push(arg),
        }
    }
    Ok(Some(out))
}

fn main() -> anyhow::Result<()> {
    let Some(args) = parse_args(std::env::args().skip(1))? else {
        println!("bemtv-node {}", VERSION);
        return Ok(());
    };

    let cfg = config::load(args.config.as_deref())?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let swarm = cfg.swarm_config();
    let node_id = uuid::Uuid::new_v4().to_string();
    let state = Arc::new(tokio::sync::Mutex::new(state::NodeState::new(swarm.clone())));
    let (actions_tx, actions_rx) = tokio::sync::mpsc::unbounded_channel();

    let client = origin::http_client(cfg.http_timeout())?;
    let rt = tokio::runtime::Runtime::new().context("starting runtime")?;
    rt.block_on(async {
        let room =
            room::discover_room(&client, &swarm.room_discovery_url, &swarm.default_room).await;
        info!(node = %node_id, signaling = %swarm.signaling_url, "node starting");

        let ctx = transport::TransportContext {
            state: state.clone(),
            room,
            node_id,
            actions: actions_tx.clone(),
        };
        let listen_port = cfg.listen_port;
        let peers = cfg.peers.clone();
        tokio::spawn(async move {
            if let Err(e) = transport::run_transport(ctx, listen_port, peers).await {
                tracing::error!("transport stopped: {}", e);
            }
        });
        tokio::spawn(driver::run_ticker(state.clone(), actions_tx));
        tokio::spawn(driver::play(state.clone(), client, args.playlist, actions_rx));
        shutdown_signal().await
    })?;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    info!("shutting down");
    Ok(())
}
