//! Relay node address loading.
//!
//! Signaling clients reach the topic mesh through one or more relay nodes
//! listed in a plain text file, one multiaddr per line.

use std::fs;
use std::path::Path;

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};
use tracing::{info, warn};

/// Load relay node multiaddrs from a file.
///
/// Empty lines and `#` comments are ignored; malformed lines are logged and
/// skipped. A missing file yields an empty list.
///
/// ```text
/// # meshcall relay nodes
/// /ip4/203.0.113.7/udp/4001/quic-v1/p2p/12D3KooW...
/// ```
pub fn load_relay_addrs(path: &Path) -> Vec<Multiaddr> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read relay address file");
            return Vec::new();
        }
    };

    let addrs = parse_multiaddrs(content.lines());
    info!(count = addrs.len(), path = %path.display(), "Loaded relay node addresses");
    addrs
}

/// Parse multiaddr strings, skipping blanks, comments and invalid entries.
pub fn parse_multiaddrs<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<Multiaddr> {
    lines
        .into_iter()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match line.parse::<Multiaddr>() {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!(line = %line, error = %e, "Skipping invalid multiaddr");
                None
            }
        })
        .collect()
}

/// The `/p2p/<peer>` component of a multiaddr, if present.
pub fn peer_id_of(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|p| match p {
        Protocol::P2p(peer_id) => Some(peer_id),
        _ => None,
    })
}
