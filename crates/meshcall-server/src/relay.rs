//! libp2p relay node.
//!
//! A circuit relay v2 **server** so that peers behind NAT can reach each
//! other, plus a GossipSub member of the signaling topic so those peers share
//! one topic mesh through it. Envelopes are forwarded as opaque bytes; the
//! node only counts them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use libp2p::{
    gossipsub::{self, IdentTopic, MessageAuthenticity},
    identify, relay,
    swarm::{NetworkBehaviour, SwarmEvent},
    Multiaddr, PeerId, SwarmBuilder,
};
use tracing::{debug, info, warn};

use meshcall_net::transport::BoxError;
use meshcall_net::signaling_gossipsub_config;
use meshcall_shared::constants::PROTOCOL_VERSION;

// ---------------------------------------------------------------------------
// Relay node behaviour
// ---------------------------------------------------------------------------

#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "RelayNodeEvent")]
pub struct RelayNodeBehaviour {
    /// Circuit relay v2 server behaviour.
    pub relay: relay::Behaviour,
    /// Identify protocol for capability advertisement.
    pub identify: identify::Behaviour,
    /// Signaling topic membership.
    pub gossipsub: gossipsub::Behaviour,
}

#[derive(Debug)]
pub enum RelayNodeEvent {
    Relay(relay::Event),
    Identify(identify::Event),
    Gossipsub(gossipsub::Event),
}

impl From<relay::Event> for RelayNodeEvent {
    fn from(event: relay::Event) -> Self {
        RelayNodeEvent::Relay(event)
    }
}

impl From<identify::Event> for RelayNodeEvent {
    fn from(event: identify::Event) -> Self {
        RelayNodeEvent::Identify(event)
    }
}

impl From<gossipsub::Event> for RelayNodeEvent {
    fn from(event: gossipsub::Event) -> Self {
        RelayNodeEvent::Gossipsub(event)
    }
}

/// Traffic counters of the relay node.
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Signaling messages received on the topic and passed on to the mesh.
    pub forwarded: AtomicU64,
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the relay node as a background tokio task.
///
/// Returns the local `PeerId` so that clients can address the relay, and the
/// counters the event loop updates.
pub async fn spawn_relay(
    listen_addr: &str,
    topic: &str,
) -> anyhow::Result<(PeerId, Arc<RelayStats>)> {
    // Ephemeral identity; clients learn it from the relay address file.
    let keypair = libp2p::identity::Keypair::generate_ed25519();
    let local_peer_id = keypair.public().to_peer_id();

    info!(peer_id = %local_peer_id, "Starting relay node");

    let mut swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_quic()
        .with_behaviour(|key| -> Result<RelayNodeBehaviour, BoxError> {
            let peer_id = key.public().to_peer_id();

            let relay = relay::Behaviour::new(peer_id, relay::Config::default());

            let identify = identify::Behaviour::new(
                identify::Config::new(PROTOCOL_VERSION.to_string(), key.public())
                    .with_push_listen_addr_updates(true)
                    .with_interval(Duration::from_secs(60)),
            );

            let gossipsub = gossipsub::Behaviour::new(
                MessageAuthenticity::Signed(key.clone()),
                signaling_gossipsub_config()?,
            )
            .map_err(|e| -> BoxError { format!("GossipSub init: {e}").into() })?;

            Ok(RelayNodeBehaviour {
                relay,
                identify,
                gossipsub,
            })
        })?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(Duration::from_secs(120)))
        .build();

    let topic = IdentTopic::new(topic);
    swarm.behaviour_mut().gossipsub.subscribe(&topic)?;

    let multiaddr: Multiaddr = listen_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen multiaddr '{}': {}", listen_addr, e))?;

    swarm.listen_on(multiaddr.clone())?;
    info!(addr = %multiaddr, topic = %topic, "Relay node listening");

    let stats = Arc::new(RelayStats::default());
    let counters = stats.clone();

    tokio::spawn(async move {
        loop {
            match swarm.select_next_some().await {
                SwarmEvent::Behaviour(RelayNodeEvent::Relay(event)) => match &event {
                    relay::Event::ReservationReqAccepted { src_peer_id, .. } => {
                        info!(peer = %src_peer_id, "Relay reservation accepted");
                    }
                    relay::Event::ReservationTimedOut { src_peer_id, .. } => {
                        debug!(peer = %src_peer_id, "Relay reservation timed out");
                    }
                    relay::Event::CircuitReqAccepted {
                        src_peer_id,
                        dst_peer_id,
                        ..
                    } => {
                        info!(src = %src_peer_id, dst = %dst_peer_id, "Circuit relay established");
                    }
                    relay::Event::CircuitClosed {
                        src_peer_id,
                        dst_peer_id,
                        ..
                    } => {
                        debug!(src = %src_peer_id, dst = %dst_peer_id, "Circuit relay closed");
                    }
                    _ => {
                        debug!(event = ?event, "Relay event");
                    }
                },

                SwarmEvent::Behaviour(RelayNodeEvent::Gossipsub(gossipsub::Event::Message {
                    propagation_source,
                    message,
                    ..
                })) => {
                    let total = counters.forwarded.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(
                        from = %propagation_source,
                        size = message.data.len(),
                        total,
                        "Forwarded signaling message"
                    );
                }

                SwarmEvent::Behaviour(RelayNodeEvent::Gossipsub(
                    gossipsub::Event::Subscribed { peer_id, topic },
                )) => {
                    debug!(peer = %peer_id, topic = %topic, "Peer joined signaling topic");
                }

                SwarmEvent::Behaviour(RelayNodeEvent::Identify(identify::Event::Received {
                    peer_id,
                    info,
                    ..
                })) => {
                    debug!(
                        peer = %peer_id,
                        protocol = ?info.protocol_version,
                        "Identify: received info from peer"
                    );
                }

                SwarmEvent::NewListenAddr { address, .. } => {
                    info!(addr = %address, "Relay node listening on new address");
                }

                SwarmEvent::ConnectionEstablished {
                    peer_id, endpoint, ..
                } => {
                    debug!(
                        peer = %peer_id,
                        addr = %endpoint.get_remote_address(),
                        "Peer connected to relay"
                    );
                }

                SwarmEvent::ConnectionClosed {
                    peer_id,
                    num_established,
                    ..
                } => {
                    if num_established == 0 {
                        debug!(peer = %peer_id, "Peer fully disconnected from relay");
                    }
                }

                SwarmEvent::IncomingConnectionError { error, .. } => {
                    warn!(error = %error, "Incoming connection error");
                }

                _ => {}
            }
        }
    });

    Ok((local_peer_id, stats))
}
