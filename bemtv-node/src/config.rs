//! Load config from file and environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use bemtv_core::config::{
    DEFAULT_FALLBACK_TIMEOUT, DEFAULT_HEARTBEAT_DELAY, DEFAULT_ROOM, DEFAULT_ROOM_DISCOVERY_URL,
    DEFAULT_SIGNALING_URL,
};
use bemtv_core::SwarmConfig;
use serde::Deserialize;

/// Node configuration. File: ~/.config/bemtv/config.toml or /etc/bemtv/config.toml.
/// Env overrides: BEMTV_LISTEN_PORT, BEMTV_ROOM_URL, BEMTV_SIGNALING_URL,
/// BEMTV_FALLBACK_TIMEOUT_MS, BEMTV_HTTP_TIMEOUT_MS, BEMTV_PEERS (comma separated), BEMTV_LOG.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Peer transport listen port (default 45680).
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_room_url")]
    pub room_discovery_url: String,
    #[serde(default = "default_signaling_url")]
    pub signaling_url: String,
    /// Wait for peers before fetching a segment from the origin (default 5000).
    #[serde(default = "default_fallback_timeout_ms")]
    pub fallback_timeout_ms: u64,
    #[serde(default = "default_heartbeat_delay_ms")]
    pub heartbeat_delay_ms: u64,
    /// Whole-request limit for room discovery and origin fetches (default 10000).
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    /// Peer addresses to dial, e.g. "10.0.0.7:45680".
    #[serde(default)]
    pub peers: Vec<String>,
    /// Tracing filter used when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen_port() -> u16 {
    45680
}
fn default_room_url() -> String {
    DEFAULT_ROOM_DISCOVERY_URL.to_string()
}
fn default_signaling_url() -> String {
    DEFAULT_SIGNALING_URL.to_string()
}
fn default_fallback_timeout_ms() -> u64 {
    DEFAULT_FALLBACK_TIMEOUT.as_millis() as u64
}
fn default_heartbeat_delay_ms() -> u64 {
    DEFAULT_HEARTBEAT_DELAY.as_millis() as u64
}
fn default_http_timeout_ms() -> u64 {
    10_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            room_discovery_url: default_room_url(),
            signaling_url: default_signaling_url(),
            fallback_timeout_ms: default_fallback_timeout_ms(),
            heartbeat_delay_ms: default_heartbeat_delay_ms(),
            http_timeout_ms: default_http_timeout_ms(),
            peers: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Core settings derived from this config.
    pub fn swarm_config(&self) -> SwarmConfig {
        SwarmConfig {
            room_discovery_url: self.room_discovery_url.clone(),
            signaling_url: self.signaling_url.clone(),
            default_room: DEFAULT_ROOM.to_string(),
            heartbeat_delay: Duration::from_millis(self.heartbeat_delay_ms),
            fallback_timeout: Duration::from_millis(self.fallback_timeout_ms),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

/// Load config: explicit path (must parse), else the first default path found, else defaults.
/// Env vars are applied last.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let c = match explicit {
        Some(p) => read_file(p)?,
        None => load_default_file().unwrap_or_default(),
    };
    Ok(apply_env(c, |k| std::env::var(k).ok()))
}

fn read_file(path: &Path) -> anyhow::Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parsing config {}", path.display()))
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/bemtv/config.toml"));
    }
    out.push(PathBuf::from("/etc/bemtv/config.toml"));
    out
}

fn load_default_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match read_file(&p) {
                Ok(c) => return Some(c),
                Err(e) => {
                    eprintln!("bemtv-node: ignoring {}: {:#}", p.display(), e);
                    break;
                }
            }
        }
    }
    None
}

/// Overlay environment values. Unparseable numbers are ignored.
pub fn apply_env(mut c: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(p) = var("BEMTV_LISTEN_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.listen_port = p;
    }
    if let Some(s) = var("BEMTV_ROOM_URL") {
        c.room_discovery_url = s;
    }
    if let Some(s) = var("BEMTV_SIGNALING_URL") {
        c.signaling_url = s;
    }
    if let Some(ms) = var("BEMTV_FALLBACK_TIMEOUT_MS").and_then(|s| s.parse::<u64>().ok()) {
        c.fallback_timeout_ms = ms;
    }
    if let Some(ms) = var("BEMTV_HTTP_TIMEOUT_MS").and_then(|s| s.parse::<u64>().ok()) {
        c.http_timeout_ms = ms;
    }
    if let Some(s) = var("BEMTV_PEERS") {
        c.peers = s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(s) = var("BEMTV_LOG") {
        c.log_level = s;
    }
    c
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_uses_defaults() {
        let c: Config = toml::from_str("").unwrap();
        assert_eq!(c.listen_port, 45680);
        assert_eq!(c.fallback_timeout_ms, 5000);
        assert_eq!(c.http_timeout(), Duration::from_secs(10));
        assert_eq!(c.swarm_config(), SwarmConfig::default());
        assert_eq!(c.room_discovery_url, "http://server.bem.tv/room");
        assert!(c.peers.is_empty());
    }

    #[test]
    fn file_values_parse() {
        let c: Config = toml::from_str(
            r#"
            listen_port = 5000
            fallback_timeout_ms = 2500
            peers = ["127.0.0.1:5001", "127.0.0.1:5002"]
            "#,
        )
        .unwrap();
        assert_eq!(c.listen_port, 5000);
        assert_eq!(c.peers.len(), 2);
        assert_eq!(
            c.swarm_config().fallback_timeout,
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn unknown_key_rejected() {
        assert!(toml::from_str::<Config>("room = \"x\"").is_err());
    }

    #[test]
    fn env_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("BEMTV_LISTEN_PORT", "6000"),
            ("BEMTV_FALLBACK_TIMEOUT_MS", "not-a-number"),
            ("BEMTV_PEERS", "a:1, b:2,,"),
            ("BEMTV_HTTP_TIMEOUT_MS", "750"),
            ("BEMTV_ROOM_URL", "http://localhost/room"),
        ]
        .into_iter()
        .collect();
        let c = apply_env(Config::default(), |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.listen_port, 6000);
        assert_eq!(c.fallback_timeout_ms, 5000);
        assert_eq!(c.http_timeout_ms, 750);
        assert_eq!(c.peers, vec!["a:1".to_string(), "b:2".to_string()]);
        assert_eq!(c.room_discovery_url, "http://localhost/room");
        assert_eq!(c.swarm_config().room_discovery_url, "http://localhost/room");
    }
}
