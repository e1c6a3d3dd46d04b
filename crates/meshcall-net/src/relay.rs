//! Signaling relay abstraction.
//!
//! A relay is a broadcast bus on one well-known topic: every subscriber sees
//! every published envelope and keeps only those addressed to itself. The
//! relay never looks inside the payload.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use meshcall_shared::protocol::SignalingEnvelope;
use meshcall_shared::types::ParticipantId;
use meshcall_shared::ProtocolError;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Relay unavailable: {0}")]
    Unavailable(String),

    #[error("Encoding error: {0}")]
    Encode(#[from] ProtocolError),
}

#[async_trait]
pub trait SignalingRelay: Send + Sync {
    /// Publish an envelope to every subscriber of the signaling topic.
    async fn publish(&self, envelope: &SignalingEnvelope) -> Result<(), RelayError>;

    /// Start receiving envelopes addressed to `local`.
    async fn subscribe(&self, local: &ParticipantId) -> Result<RelaySubscription, RelayError>;

    /// Tear down the topic subscription taken by [`SignalingRelay::subscribe`].
    async fn unsubscribe(&self) -> Result<(), RelayError>;
}

/// Receiving half of a relay subscription, filtered to one participant.
pub struct RelaySubscription {
    local: ParticipantId,
    rx: broadcast::Receiver<Bytes>,
}

impl RelaySubscription {
    pub fn new(local: ParticipantId, rx: broadcast::Receiver<Bytes>) -> Self {
        Self { local, rx }
    }

    /// Next envelope addressed to the local participant.
    ///
    /// Undecodable envelopes are logged and skipped. Returns `None` once the
    /// relay side is gone.
    pub async fn recv(&mut self) -> Option<SignalingEnvelope> {
        loop {
            match self.rx.recv().await {
                Ok(bytes) => match SignalingEnvelope::decode(&bytes) {
                    Ok(envelope) if envelope.is_addressed_to(&self.local) => {
                        return Some(envelope)
                    }
                    Ok(envelope) => {
                        trace!(to = %envelope.to.short(), "Discarding envelope for another participant");
                    }
                    Err(e) => {
                        warn!(error = %e, len = bytes.len(), "Dropping malformed signaling envelope");
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Signaling subscriber lagged, envelopes lost");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn local(&self) -> &ParticipantId {
        &self.local
    }
}

/// In-process relay backed by a tokio broadcast channel.
///
/// Every participant in the same process shares one bus; useful for tests
/// and single-host deployments.
pub struct LocalRelay {
    tx: broadcast::Sender<Bytes>,
    subscriptions: AtomicUsize,
}

impl LocalRelay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            subscriptions: AtomicUsize::new(0),
        }
    }

    /// Publish raw bytes as-is, bypassing the envelope encoder.
    #[cfg(test)]
    pub(crate) fn publish_raw(&self, data: Bytes) {
        let _ = self.tx.send(data);
    }

    /// Number of live topic subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

impl Default for LocalRelay {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl SignalingRelay for LocalRelay {
    async fn publish(&self, envelope: &SignalingEnvelope) -> Result<(), RelayError> {
        let data = envelope.encode()?;
        debug!(
            from = %envelope.from.short(),
            to = %envelope.to.short(),
            kind = envelope.payload.kind(),
            "Publishing envelope on local relay"
        );
        // No receivers is not an error: the addressee may not have joined yet.
        let _ = self.tx.send(Bytes::from(data));
        Ok(())
    }

    async fn subscribe(&self, local: &ParticipantId) -> Result<RelaySubscription, RelayError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(RelaySubscription::new(local.clone(), self.tx.subscribe()))
    }

    async fn unsubscribe(&self) -> Result<(), RelayError> {
        let _ = self
            .subscriptions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshcall_shared::protocol::{IceCandidate, SignalPayload};

    fn ice(from: &str, to: &str) -> SignalingEnvelope {
        SignalingEnvelope::new(
            from.into(),
            to.into(),
            SignalPayload::Ice(IceCandidate::new("candidate:1 1 udp 1 10.0.0.1 1000 typ host")),
        )
    }

    #[tokio::test]
    async fn test_subscriber_only_sees_own_envelopes() {
        let relay = LocalRelay::default();
        let mut bob = relay.subscribe(&"bob".into()).await.unwrap();

        relay.publish(&ice("alice", "carol")).await.unwrap();
        relay.publish(&ice("alice", "bob")).await.unwrap();

        let env = bob.recv().await.unwrap();
        assert_eq!(env.from, ParticipantId::new("alice"));
        assert_eq!(env.to, ParticipantId::new("bob"));
    }

    #[tokio::test]
    async fn test_malformed_envelopes_are_skipped() {
        let relay = LocalRelay::default();
        let mut bob = relay.subscribe(&"bob".into()).await.unwrap();

        relay.publish_raw(Bytes::from_static(br#"{"from":"x","to":"bob","type":"bye","data":{}}"#));
        relay.publish_raw(Bytes::from_static(b"garbage"));
        relay.publish(&ice("alice", "bob")).await.unwrap();

        let env = bob.recv().await.unwrap();
        assert_eq!(env.payload.kind(), "ice");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        let relay = LocalRelay::default();
        assert!(relay.publish(&ice("alice", "bob")).await.is_ok());
    }

    #[tokio::test]
    async fn test_subscription_count_tracks_unsubscribe() {
        let relay = LocalRelay::default();
        let _sub = relay.subscribe(&"alice".into()).await.unwrap();
        assert_eq!(relay.subscription_count(), 1);

        relay.unsubscribe().await.unwrap();
        relay.unsubscribe().await.unwrap();
        assert_eq!(relay.subscription_count(), 0);
    }
}
