/// Protocol version string for libp2p identify
pub const PROTOCOL_VERSION: &str = "/meshcall/1.0.0";

/// Application name
pub const APP_NAME: &str = "meshcall";

/// Well-known pub/sub topic carrying signaling envelopes for every call
pub const SIGNALING_TOPIC: &str = "meshcall-signaling";

/// Maximum encoded envelope size in bytes (64 KiB, SDP blobs stay far below)
pub const MAX_ENVELOPE_SIZE: usize = 65_536;

/// GossipSub heartbeat interval in seconds
pub const GOSSIPSUB_HEARTBEAT_SECS: u64 = 1;

/// Default QUIC listen port
pub const DEFAULT_QUIC_PORT: u16 = 4001;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default membership poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Upper bound for the membership poll backoff in milliseconds
pub const MAX_POLL_BACKOFF_MS: u64 = 30_000;

/// How many times a failed peer link is recreated before giving up
pub const DEFAULT_MAX_LINK_RETRIES: u32 = 2;

/// Public STUN server used when no ICE servers are configured
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";
