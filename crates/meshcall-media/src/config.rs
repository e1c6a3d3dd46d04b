//! Call configuration loaded from environment variables.

use std::time::Duration;

use meshcall_shared::constants::{
    DEFAULT_MAX_LINK_RETRIES, DEFAULT_POLL_INTERVAL_MS, DEFAULT_STUN_SERVER,
};

/// Which local capture tracks to request at join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub audio: bool,
    pub video: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallConfig {
    /// STUN/TURN urls handed to every native peer connection.
    /// Env: `MESHCALL_ICE_SERVERS` (comma separated)
    /// Default: one public STUN server
    pub ice_servers: Vec<String>,

    /// Interval between membership polls while the directory is healthy.
    /// Env: `MESHCALL_POLL_INTERVAL_MS`
    /// Default: `2000`
    pub poll_interval: Duration,

    /// How many times a failed link is recreated before it stays closed.
    /// Env: `MESHCALL_MAX_LINK_RETRIES`
    /// Default: `2`
    pub max_link_retries: u32,

    /// Env: `MESHCALL_AUDIO`, `MESHCALL_VIDEO` (true/false)
    pub capture: CaptureConfig,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_link_retries: DEFAULT_MAX_LINK_RETRIES,
            capture: CaptureConfig::default(),
        }
    }
}

impl CallConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("MESHCALL_ICE_SERVERS") {
            config.ice_servers = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(val) = lookup("MESHCALL_POLL_INTERVAL_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.poll_interval = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid MESHCALL_POLL_INTERVAL_MS, using default"),
            }
        }

        if let Some(val) = lookup("MESHCALL_MAX_LINK_RETRIES") {
            match val.parse::<u32>() {
                Ok(n) => config.max_link_retries = n,
                Err(_) => tracing::warn!(value = %val, "Invalid MESHCALL_MAX_LINK_RETRIES, using default"),
            }
        }

        if let Some(val) = lookup("MESHCALL_AUDIO") {
            config.capture.audio = val != "false" && val != "0";
        }

        if let Some(val) = lookup("MESHCALL_VIDEO") {
            config.capture.video = val != "false" && val != "0";
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> CallConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CallConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]);
        assert_eq!(config.ice_servers, vec![DEFAULT_STUN_SERVER.to_string()]);
        assert_eq!(config.poll_interval, Duration::from_millis(2_000));
        assert_eq!(config.max_link_retries, 2);
        assert!(config.capture.audio);
        assert!(!config.capture.video);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("MESHCALL_ICE_SERVERS", "stun:a.example:3478, turn:b.example:3478,"),
            ("MESHCALL_POLL_INTERVAL_MS", "250"),
            ("MESHCALL_MAX_LINK_RETRIES", "0"),
            ("MESHCALL_AUDIO", "0"),
            ("MESHCALL_VIDEO", "true"),
        ]);
        assert_eq!(config.ice_servers, vec!["stun:a.example:3478", "turn:b.example:3478"]);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.max_link_retries, 0);
        assert!(!config.capture.audio);
        assert!(config.capture.video);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = load(&[
            ("MESHCALL_POLL_INTERVAL_MS", "soon"),
            ("MESHCALL_MAX_LINK_RETRIES", "-1"),
        ]);
        assert_eq!(config.poll_interval, Duration::from_millis(2_000));
        assert_eq!(config.max_link_retries, 2);
    }
}
