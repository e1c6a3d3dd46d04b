use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use libp2p::gossipsub::{self, MessageAuthenticity, MessageId, ValidationMode};
use libp2p::identity::Keypair;
use libp2p::{dcutr, identify, noise, yamux, Swarm, SwarmBuilder};
use tracing::info;

use meshcall_shared::constants::{GOSSIPSUB_HEARTBEAT_SECS, MAX_ENVELOPE_SIZE, PROTOCOL_VERSION};

use crate::behaviour::MeshcallBehaviour;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// GossipSub settings shared by signaling clients and the relay node.
///
/// Identical envelopes from the same author collapse into one message id, so
/// replays over several mesh paths are delivered once.
pub fn signaling_gossipsub_config() -> Result<gossipsub::Config, BoxError> {
    let message_id_fn = |message: &gossipsub::Message| {
        let mut hasher = DefaultHasher::new();
        message.data.hash(&mut hasher);
        if let Some(ref source) = message.source {
            source.hash(&mut hasher);
        }
        if let Some(seqno) = message.sequence_number {
            seqno.hash(&mut hasher);
        }
        MessageId::from(hasher.finish().to_string())
    };

    gossipsub::ConfigBuilder::default()
        .heartbeat_interval(Duration::from_secs(GOSSIPSUB_HEARTBEAT_SECS))
        .validation_mode(ValidationMode::Strict)
        .max_transmit_size(MAX_ENVELOPE_SIZE)
        .message_id_fn(message_id_fn)
        .build()
        .map_err(|e| -> BoxError { format!("GossipSub config: {e}").into() })
}

/// Build a QUIC swarm with relay-client transport for a signaling client.
pub fn build_swarm(keypair: Keypair) -> anyhow::Result<Swarm<MeshcallBehaviour>> {
    let swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_quic()
        .with_relay_client(noise::Config::new, yamux::Config::default)?
        .with_behaviour(|key, relay_client| -> Result<MeshcallBehaviour, BoxError> {
            let local_peer_id = key.public().to_peer_id();

            let gossipsub_config = signaling_gossipsub_config()?;

            let gossipsub = gossipsub::Behaviour::new(
                MessageAuthenticity::Signed(key.clone()),
                gossipsub_config,
            )
            .map_err(|e| -> BoxError { format!("GossipSub init: {e}").into() })?;

            let identify = identify::Behaviour::new(
                identify::Config::new(PROTOCOL_VERSION.to_string(), key.public())
                    .with_push_listen_addr_updates(true)
                    .with_interval(Duration::from_secs(60)),
            );

            let dcutr = dcutr::Behaviour::new(local_peer_id);

            Ok(MeshcallBehaviour {
                gossipsub,
                identify,
                relay_client,
                dcutr,
            })
        })?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(Duration::from_secs(60)))
        .build();

    info!(
        peer_id = %swarm.local_peer_id(),
        "Built signaling swarm with QUIC + relay transport"
    );

    Ok(swarm)
}
