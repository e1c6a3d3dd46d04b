//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use meshcall_shared::constants::{DEFAULT_HTTP_PORT, DEFAULT_QUIC_PORT, SIGNALING_TOPIC};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// libp2p multiaddr of the relay node (QUIC).
    /// Env: `LISTEN_ADDR`
    /// Default: `/ip4/0.0.0.0/udp/4001/quic-v1`
    pub listen_addr: String,

    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite file holding calls, participants and profiles.
    /// Env: `DATABASE_PATH`
    /// Default: `./meshcall.db`
    pub database_path: PathBuf,

    /// GossipSub topic the relay node joins.
    /// Env: `SIGNALING_TOPIC`
    pub signaling_topic: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("/ip4/0.0.0.0/udp/{DEFAULT_QUIC_PORT}/quic-v1"),
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./meshcall.db"),
            signaling_topic: SIGNALING_TOPIC.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("LISTEN_ADDR") {
            if addr.parse::<libp2p::Multiaddr>().is_ok() {
                config.listen_addr = addr;
            } else {
                tracing::warn!(value = %addr, "Invalid LISTEN_ADDR, using default");
            }
        }

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = PathBuf::from(path);
            }
        }

        if let Some(topic) = lookup("SIGNALING_TOPIC") {
            if topic.trim().is_empty() {
                tracing::warn!("Empty SIGNALING_TOPIC, using default");
            } else {
                config.signaling_topic = topic;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.listen_addr, "/ip4/0.0.0.0/udp/4001/quic-v1");
        assert_eq!(config.signaling_topic, "meshcall-signaling");
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/var/lib/meshcall/calls.db"),
            ("SIGNALING_TOPIC", "staging-signaling"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.database_path, PathBuf::from("/var/lib/meshcall/calls.db"));
        assert_eq!(config.signaling_topic, "staging-signaling");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_map(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("LISTEN_ADDR", "udp:4001"),
            ("SIGNALING_TOPIC", "  "),
        ]);
        let defaults = ServerConfig::default();
        assert_eq!(config.http_addr, defaults.http_addr);
        assert_eq!(config.listen_addr, defaults.listen_addr);
        assert_eq!(config.signaling_topic, defaults.signaling_topic);
    }
}
