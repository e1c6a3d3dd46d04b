//! Composed libp2p `NetworkBehaviour` for signaling clients.
//!
//! GossipSub carries the signaling topic, Identify negotiates protocols with
//! the relay node, the relay client and DCUtR let peers behind NAT reach the
//! topic mesh through the relay node.

use libp2p::{dcutr, gossipsub, identify, relay, swarm::NetworkBehaviour};

/// Composed network behaviour for signaling clients.
///
/// All sub-behaviours are driven by the single swarm event loop in
/// [`crate::swarm::spawn_swarm`]. Construction is handled by
/// [`crate::transport::build_swarm`] via `SwarmBuilder`.
#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "MeshcallEvent")]
pub struct MeshcallBehaviour {
    /// Pub/sub bus for signaling envelopes
    pub gossipsub: gossipsub::Behaviour,
    /// Protocol identification and capability advertisement
    pub identify: identify::Behaviour,
    /// Circuit relay v2 client for NAT traversal
    pub relay_client: relay::client::Behaviour,
    /// Direct Connection Upgrade through Relay
    pub dcutr: dcutr::Behaviour,
}

/// Events emitted by the composed behaviour, one variant per sub-behaviour.
#[derive(Debug)]
pub enum MeshcallEvent {
    Gossipsub(gossipsub::Event),
    Identify(identify::Event),
    RelayClient(relay::client::Event),
    Dcutr(dcutr::Event),
}

impl From<gossipsub::Event> for MeshcallEvent {
    fn from(event: gossipsub::Event) -> Self {
        MeshcallEvent::Gossipsub(event)
    }
}

impl From<identify::Event> for MeshcallEvent {
    fn from(event: identify::Event) -> Self {
        MeshcallEvent::Identify(event)
    }
}

impl From<relay::client::Event> for MeshcallEvent {
    fn from(event: relay::client::Event) -> Self {
        MeshcallEvent::RelayClient(event)
    }
}

impl From<dcutr::Event> for MeshcallEvent {
    fn from(event: dcutr::Event) -> Self {
        MeshcallEvent::Dcutr(event)
    }
}
