//! GossipSub-backed signaling relay.
//!
//! Every client subscribes to the one signaling topic; the topic mesh (usually
//! through a relay node) fans each envelope out to all of them.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use meshcall_shared::protocol::SignalingEnvelope;
use meshcall_shared::types::ParticipantId;

use crate::relay::{RelayError, RelaySubscription, SignalingRelay};
use crate::swarm::{spawn_swarm, SwarmCommand, SwarmConfig, SwarmNotification};

const INBOUND_CAPACITY: usize = 1024;

pub struct GossipRelay {
    cmd_tx: mpsc::Sender<SwarmCommand>,
    topic: String,
    inbound: broadcast::Sender<Bytes>,
}

impl GossipRelay {
    /// Start a swarm and wrap it as a relay on `config.topic`.
    pub async fn spawn(
        keypair: libp2p::identity::Keypair,
        config: SwarmConfig,
    ) -> anyhow::Result<Self> {
        let topic = config.topic.clone();
        let (cmd_tx, notif_rx, peer_id) = spawn_swarm(keypair, config).await?;
        info!(peer_id = %peer_id, topic = %topic, "GossipSub signaling relay started");
        Ok(Self::from_channels(cmd_tx, notif_rx, topic))
    }

    /// Wrap an already running swarm's channels.
    pub fn from_channels(
        cmd_tx: mpsc::Sender<SwarmCommand>,
        notif_rx: mpsc::Receiver<SwarmNotification>,
        topic: String,
    ) -> Self {
        let (inbound, _) = broadcast::channel(INBOUND_CAPACITY);
        tokio::spawn(forward_topic(notif_rx, topic.clone(), inbound.clone()));
        Self {
            cmd_tx,
            topic,
            inbound,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    async fn send(&self, cmd: SwarmCommand) -> Result<(), RelayError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| RelayError::Unavailable("swarm task has stopped".into()))
    }
}

/// Pump topic messages from the swarm into the broadcast bus.
async fn forward_topic(
    mut notif_rx: mpsc::Receiver<SwarmNotification>,
    topic: String,
    inbound: broadcast::Sender<Bytes>,
) {
    while let Some(notification) = notif_rx.recv().await {
        match notification {
            SwarmNotification::MessageReceived {
                topic: t, data, ..
            } if t == topic => {
                let _ = inbound.send(Bytes::from(data));
            }
            SwarmNotification::PeerConnected { peer_id, .. } => {
                debug!(peer = %peer_id, "Signaling mesh peer connected");
            }
            SwarmNotification::PeerDisconnected { peer_id } => {
                debug!(peer = %peer_id, "Signaling mesh peer disconnected");
            }
            _ => {}
        }
    }
    debug!(topic = %topic, "Swarm notifications closed");
}

#[async_trait]
impl SignalingRelay for GossipRelay {
    async fn publish(&self, envelope: &SignalingEnvelope) -> Result<(), RelayError> {
        let data = envelope.encode()?;
        debug!(
            to = %envelope.to.short(),
            kind = envelope.payload.kind(),
            len = data.len(),
            "Publishing envelope on signaling topic"
        );
        let (ack, verdict) = oneshot::channel();
        self.send(SwarmCommand::Publish {
            topic: self.topic.clone(),
            data,
            ack,
        })
        .await?;
        match verdict.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => {
                warn!(to = %envelope.to.short(), error = %reason, "Envelope not published");
                Err(RelayError::Unavailable(reason))
            }
            Err(_) => Err(RelayError::Unavailable("swarm task has stopped".into())),
        }
    }

    async fn subscribe(&self, local: &ParticipantId) -> Result<RelaySubscription, RelayError> {
        let rx = self.inbound.subscribe();
        self.send(SwarmCommand::Subscribe(self.topic.clone())).await?;
        Ok(RelaySubscription::new(local.clone(), rx))
    }

    async fn unsubscribe(&self) -> Result<(), RelayError> {
        self.send(SwarmCommand::Unsubscribe(self.topic.clone())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshcall_shared::protocol::{SessionDescription, SignalPayload};

    fn relay() -> (
        GossipRelay,
        mpsc::Receiver<SwarmCommand>,
        mpsc::Sender<SwarmNotification>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (notif_tx, notif_rx) = mpsc::channel(16);
        let relay = GossipRelay::from_channels(cmd_tx, notif_rx, "meshcall-signaling".into());
        (relay, cmd_rx, notif_tx)
    }

    fn offer(from: &str, to: &str) -> SignalingEnvelope {
        SignalingEnvelope::new(
            from.into(),
            to.into(),
            SignalPayload::Offer(SessionDescription::offer("v=0")),
        )
    }

    /// Answer every publish on `cmd_rx` with `verdict`, handing back the
    /// published payloads.
    fn answer_publishes(
        mut cmd_rx: mpsc::Receiver<SwarmCommand>,
        verdict: Result<(), String>,
    ) -> tokio::task::JoinHandle<Vec<(String, Vec<u8>)>> {
        tokio::spawn(async move {
            let mut published = Vec::new();
            while let Some(cmd) = cmd_rx.recv().await {
                if let SwarmCommand::Publish { topic, data, ack } = cmd {
                    published.push((topic, data));
                    let _ = ack.send(verdict.clone());
                }
            }
            published
        })
    }

    #[tokio::test]
    async fn test_publish_sends_encoded_envelope() {
        let (relay, cmd_rx, _notif_tx) = relay();
        let swarm = answer_publishes(cmd_rx, Ok(()));
        relay.publish(&offer("alice", "bob")).await.unwrap();
        drop(relay);

        let published = swarm.await.unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "meshcall-signaling");
        assert_eq!(
            SignalingEnvelope::decode(&published[0].1).unwrap(),
            offer("alice", "bob")
        );
    }

    #[tokio::test]
    async fn test_rejected_publish_is_reported() {
        let (relay, cmd_rx, _notif_tx) = relay();
        let _swarm = answer_publishes(cmd_rx, Err("InsufficientPeers".into()));

        match relay.publish(&offer("alice", "bob")).await {
            Err(RelayError::Unavailable(reason)) => assert_eq!(reason, "InsufficientPeers"),
            other => panic!("unexpected publish result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publish_dropped_by_swarm_is_unavailable() {
        let (relay, mut cmd_rx, _notif_tx) = relay();
        tokio::spawn(async move {
            // Swallow the command and its reply sender.
            let _ = cmd_rx.recv().await;
        });
        assert!(matches!(
            relay.publish(&offer("alice", "bob")).await,
            Err(RelayError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_subscription_receives_topic_messages_only() {
        let (relay, mut cmd_rx, notif_tx) = relay();
        let mut sub = relay.subscribe(&"bob".into()).await.unwrap();
        assert!(matches!(cmd_rx.recv().await, Some(SwarmCommand::Subscribe(_))));

        notif_tx
            .send(SwarmNotification::MessageReceived {
                source: None,
                topic: "other-topic".into(),
                data: offer("carol", "bob").encode().unwrap(),
            })
            .await
            .unwrap();
        notif_tx
            .send(SwarmNotification::MessageReceived {
                source: None,
                topic: "meshcall-signaling".into(),
                data: offer("alice", "bob").encode().unwrap(),
            })
            .await
            .unwrap();

        let env = sub.recv().await.unwrap();
        assert_eq!(env.from, ParticipantId::new("alice"));
    }

    #[tokio::test]
    async fn test_stopped_swarm_reports_unavailable() {
        let (relay, cmd_rx, _notif_tx) = relay();
        drop(cmd_rx);
        assert!(matches!(
            relay.publish(&offer("alice", "bob")).await,
            Err(RelayError::Unavailable(_))
        ));
    }
}
