//! Swarm orchestration with the tokio mpsc command/notification pattern.
//!
//! The swarm event loop runs in a dedicated tokio task. Callers talk to it
//! through typed command and notification channels only. Commands whose
//! outcome matters to the caller carry a `oneshot` reply.

use std::collections::HashSet;
use std::path::PathBuf;

use futures::StreamExt;
use libp2p::{gossipsub, identify, multiaddr::Protocol, relay, swarm::SwarmEvent, Multiaddr, PeerId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use meshcall_shared::constants::{DEFAULT_QUIC_PORT, SIGNALING_TOPIC};

use crate::behaviour::MeshcallEvent;
use crate::discovery::load_relay_addrs;
use crate::transport::build_swarm;

/// Commands sent *into* the swarm task.
#[derive(Debug)]
pub enum SwarmCommand {
    /// Dial a remote peer at the given multiaddr.
    Dial(Multiaddr),
    /// Publish raw bytes on a GossipSub topic.
    ///
    /// `ack` receives the gossipsub verdict, e.g. `InsufficientPeers` when
    /// nobody is subscribed to the topic yet.
    Publish {
        topic: String,
        data: Vec<u8>,
        ack: oneshot::Sender<Result<(), String>>,
    },
    /// Subscribe to a GossipSub topic.
    Subscribe(String),
    /// Leave a GossipSub topic.
    Unsubscribe(String),
    /// Stop the event loop.
    Shutdown,
}

/// Notifications sent *from* the swarm task.
#[derive(Debug, Clone)]
pub enum SwarmNotification {
    /// A new peer connected, directly or through a relay circuit.
    PeerConnected { peer_id: PeerId, address: Multiaddr },
    /// The last connection to a peer closed.
    PeerDisconnected { peer_id: PeerId },
    /// A GossipSub message was received.
    MessageReceived {
        source: Option<PeerId>,
        topic: String,
        data: Vec<u8>,
    },
    /// A relay node accepted our reservation.
    RelayReservation { relay_peer: PeerId },
}

/// Configuration for spawning the swarm.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// UDP port for the QUIC listener.
    pub listen_port: u16,
    /// File listing relay node multiaddrs, one per line.
    pub relay_addrs_path: Option<PathBuf>,
    /// Additional multiaddrs to dial on startup.
    pub extra_dials: Vec<Multiaddr>,
    /// GossipSub topic carrying signaling envelopes.
    pub topic: String,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_QUIC_PORT,
            relay_addrs_path: None,
            extra_dials: Vec::new(),
            topic: SIGNALING_TOPIC.to_string(),
        }
    }
}

/// Spawn the libp2p swarm in a background tokio task.
///
/// Returns channels for sending commands and receiving notifications,
/// plus the local `PeerId`.
///
/// # Arguments
///
/// * `keypair` - The node's identity keypair
/// * `config` - Swarm configuration (listen port, relay nodes, topic)
///
/// # Returns
///
/// `(command_tx, notification_rx, local_peer_id)`
pub async fn spawn_swarm(
    keypair: libp2p::identity::Keypair,
    config: SwarmConfig,
) -> anyhow::Result<(
    mpsc::Sender<SwarmCommand>,
    mpsc::Receiver<SwarmNotification>,
    PeerId,
)> {
    let mut swarm = build_swarm(keypair)?;
    let local_peer_id = *swarm.local_peer_id();

    let listen_v4: Multiaddr = format!("/ip4/0.0.0.0/udp/{}/quic-v1", config.listen_port).parse()?;
    let listen_v6: Multiaddr = format!("/ip6/::/udp/{}/quic-v1", config.listen_port).parse()?;
    swarm.listen_on(listen_v4)?;
    swarm.listen_on(listen_v6)?;

    info!(peer_id = %local_peer_id, port = config.listen_port, "Swarm listening");

    let mut dials = config.extra_dials.clone();
    if let Some(ref path) = config.relay_addrs_path {
        dials.extend(load_relay_addrs(path));
    }
    for addr in &dials {
        match swarm.dial(addr.clone()) {
            Ok(()) => debug!(addr = %addr, "Dialing relay node"),
            Err(e) => warn!(addr = %addr, error = %e, "Failed to dial relay node"),
        }
    }

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SwarmCommand>(256);
    let (notif_tx, notif_rx) = mpsc::channel::<SwarmNotification>(256);

    tokio::spawn(async move {
        let mut connected: HashSet<PeerId> = HashSet::new();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SwarmCommand::Dial(addr)) => {
                            if let Err(e) = swarm.dial(addr.clone()) {
                                error!(addr = %addr, error = %e, "Dial failed");
                            }
                        }
                        Some(SwarmCommand::Publish { topic, data, ack }) => {
                            let ident = gossipsub::IdentTopic::new(&topic);
                            let result = match swarm.behaviour_mut().gossipsub.publish(ident, data) {
                                Ok(_) => Ok(()),
                                Err(e) => {
                                    warn!(topic = %topic, peers = connected.len(), error = %e, "Publish failed");
                                    Err(e.to_string())
                                }
                            };
                            let _ = ack.send(result);
                        }
                        Some(SwarmCommand::Subscribe(topic)) => {
                            let ident = gossipsub::IdentTopic::new(&topic);
                            if let Err(e) = swarm.behaviour_mut().gossipsub.subscribe(&ident) {
                                error!(topic = %topic, error = %e, "Subscribe failed");
                            }
                        }
                        Some(SwarmCommand::Unsubscribe(topic)) => {
                            let ident = gossipsub::IdentTopic::new(&topic);
                            if let Err(e) = swarm.behaviour_mut().gossipsub.unsubscribe(&ident) {
                                error!(topic = %topic, error = %e, "Unsubscribe failed");
                            }
                        }
                        Some(SwarmCommand::Shutdown) => {
                            info!("Swarm shutdown requested");
                            break;
                        }
                        None => {
                            info!("Command channel closed, shutting down swarm");
                            break;
                        }
                    }
                }

                event = swarm.select_next_some() => {
                    match event {
                        SwarmEvent::Behaviour(MeshcallEvent::Gossipsub(
                            gossipsub::Event::Message { message, .. },
                        )) => {
                            let topic = message.topic.to_string();
                            debug!(
                                topic = %topic,
                                source = ?message.source,
                                len = message.data.len(),
                                "GossipSub message received"
                            );
                            let _ = notif_tx
                                .send(SwarmNotification::MessageReceived {
                                    source: message.source,
                                    topic,
                                    data: message.data,
                                })
                                .await;
                        }

                        SwarmEvent::Behaviour(MeshcallEvent::Identify(
                            identify::Event::Received { peer_id, info, .. },
                        )) => {
                            debug!(
                                peer = %peer_id,
                                protocol = ?info.protocol_version,
                                "Identify: received info from peer"
                            );
                        }

                        SwarmEvent::Behaviour(MeshcallEvent::RelayClient(
                            relay::client::Event::ReservationReqAccepted { relay_peer_id, .. },
                        )) => {
                            info!(relay = %relay_peer_id, "Relay reservation accepted");
                            let _ = notif_tx
                                .send(SwarmNotification::RelayReservation {
                                    relay_peer: relay_peer_id,
                                })
                                .await;
                        }

                        SwarmEvent::Behaviour(MeshcallEvent::Dcutr(event)) => {
                            debug!(event = ?event, "DCUtR event");
                        }

                        SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                            let addr = endpoint.get_remote_address().clone();
                            let relayed = addr.iter().any(|p| matches!(p, Protocol::P2pCircuit));
                            connected.insert(peer_id);
                            info!(peer = %peer_id, addr = %addr, relayed, "Peer connected");
                            let _ = notif_tx
                                .send(SwarmNotification::PeerConnected { peer_id, address: addr })
                                .await;
                        }

                        SwarmEvent::ConnectionClosed { peer_id, num_established, .. } => {
                            if num_established == 0 {
                                connected.remove(&peer_id);
                                info!(peer = %peer_id, "Peer disconnected");
                                let _ = notif_tx
                                    .send(SwarmNotification::PeerDisconnected { peer_id })
                                    .await;
                            }
                        }

                        SwarmEvent::NewListenAddr { address, .. } => {
                            info!(addr = %address, "Listening on new address");
                        }

                        SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                            warn!(peer = ?peer_id, error = %error, "Outgoing connection error");
                        }

                        SwarmEvent::IncomingConnectionError { error, .. } => {
                            warn!(error = %error, "Incoming connection error");
                        }

                        _ => {}
                    }
                }
            }
        }

        info!("Swarm event loop terminated");
    });

    Ok((cmd_tx, notif_rx, local_peer_id))
}
