//! Negotiation state machine of one (local, remote) pair.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use meshcall_shared::protocol::{IceCandidate, SessionDescription, SignalPayload, SignalingEnvelope};
use meshcall_shared::types::ParticipantId;

use crate::error::LinkError;
use crate::native::PeerConnection;

/// Who sends the offer on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    /// The lexicographically smaller id initiates. Both ends compute the
    /// same answer, so two offers never cross.
    pub fn for_pair(local: &ParticipantId, remote: &ParticipantId) -> Self {
        if local < remote {
            Role::Initiator
        } else {
            Role::Responder
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkState {
    Idle,
    OfferCreated,
    AwaitingAnswer,
    AwaitingOffer,
    AnswerCreated,
    Connected,
    Closed,
}

impl LinkState {
    pub fn is_closed(&self) -> bool {
        matches!(self, LinkState::Closed)
    }
}

pub struct PeerLink {
    local: ParticipantId,
    remote: ParticipantId,
    role: Role,
    generation: u64,
    state: LinkState,
    conn: Arc<dyn PeerConnection>,
    /// SDP of the applied remote description.
    remote_sdp: Option<String>,
    pending_candidates: Vec<IceCandidate>,
}

impl PeerLink {
    pub fn new(
        local: ParticipantId,
        remote: ParticipantId,
        generation: u64,
        conn: Arc<dyn PeerConnection>,
    ) -> Self {
        let role = Role::for_pair(&local, &remote);
        Self {
            local,
            remote,
            role,
            generation,
            state: LinkState::Idle,
            conn,
            remote_sdp: None,
            pending_candidates: Vec::new(),
        }
    }

    pub fn remote(&self) -> &ParticipantId {
        &self.remote
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn connection(&self) -> &dyn PeerConnection {
        self.conn.as_ref()
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    fn envelope(&self, payload: SignalPayload) -> SignalingEnvelope {
        SignalingEnvelope::new(self.local.clone(), self.remote.clone(), payload)
    }

    fn transition(&mut self, next: LinkState) {
        debug!(
            remote = %self.remote.short(),
            from = ?self.state,
            to = ?next,
            "Link state change"
        );
        self.state = next;
    }

    /// Leave `Idle`. The initiator creates its offer and returns it for
    /// publishing; the responder starts waiting for one.
    pub async fn start(&mut self) -> Result<Option<SignalingEnvelope>, LinkError> {
        if self.state != LinkState::Idle {
            return Ok(None);
        }
        match self.role {
            Role::Initiator => {
                let offer = match self.conn.create_offer().await {
                    Ok(offer) => offer,
                    Err(e) => return Err(self.fail(e).await),
                };
                self.transition(LinkState::OfferCreated);
                Ok(Some(self.envelope(SignalPayload::Offer(offer))))
            }
            Role::Responder => {
                self.transition(LinkState::AwaitingOffer);
                Ok(None)
            }
        }
    }

    /// The envelope returned by [`start`](Self::start) or
    /// [`handle`](Self::handle) has been published.
    pub fn on_sent(&mut self) {
        match self.state {
            LinkState::OfferCreated => self.transition(LinkState::AwaitingAnswer),
            LinkState::AnswerCreated => {
                self.transition(LinkState::Connected);
                info!(remote = %self.remote.short(), "Peer link connected");
            }
            _ => {}
        }
    }

    /// Whether `offer` means the remote side rebuilt its end of the link:
    /// a responder already past waiting receives a description it has not
    /// applied before.
    pub fn is_restart_offer(&self, offer: &SessionDescription) -> bool {
        self.role == Role::Responder
            && !matches!(self.state, LinkState::Idle | LinkState::AwaitingOffer)
            && self.remote_sdp.as_deref() != Some(offer.sdp.as_str())
    }

    /// Drive the state machine with one inbound payload. Returns a reply to
    /// publish, if any. An error means the link is now `Closed`.
    pub async fn handle(
        &mut self,
        payload: SignalPayload,
    ) -> Result<Option<SignalingEnvelope>, LinkError> {
        if self.state.is_closed() {
            debug!(remote = %self.remote.short(), kind = payload.kind(), "Ignoring envelope for closed link");
            return Ok(None);
        }

        match payload {
            SignalPayload::Offer(offer) => self.on_offer(offer).await,
            SignalPayload::Answer(answer) => self.on_answer(answer).await.map(|_| None),
            SignalPayload::Ice(candidate) => self.on_remote_candidate(candidate).await.map(|_| None),
        }
    }

    async fn on_offer(
        &mut self,
        offer: SessionDescription,
    ) -> Result<Option<SignalingEnvelope>, LinkError> {
        if self.role == Role::Initiator {
            let err = LinkError::Protocol("offer received by the initiating side".into());
            return Err(self.fail(err).await);
        }
        if !matches!(self.state, LinkState::Idle | LinkState::AwaitingOffer) {
            debug!(remote = %self.remote.short(), state = ?self.state, "Ignoring duplicate offer");
            return Ok(None);
        }

        if let Err(e) = self.apply_remote(&offer).await {
            return Err(self.fail(e).await);
        }
        let answer = match self.conn.create_answer().await {
            Ok(answer) => answer,
            Err(e) => return Err(self.fail(e).await),
        };
        self.transition(LinkState::AnswerCreated);
        Ok(Some(self.envelope(SignalPayload::Answer(answer))))
    }

    async fn on_answer(&mut self, answer: SessionDescription) -> Result<(), LinkError> {
        match self.state {
            LinkState::AwaitingAnswer => {
                if let Err(e) = self.apply_remote(&answer).await {
                    return Err(self.fail(e).await);
                }
                self.transition(LinkState::Connected);
                info!(remote = %self.remote.short(), "Peer link connected");
                Ok(())
            }
            LinkState::Idle | LinkState::AwaitingOffer => {
                let err = LinkError::Protocol("answer received before any offer".into());
                Err(self.fail(err).await)
            }
            state => {
                debug!(remote = %self.remote.short(), state = ?state, "Ignoring stale answer");
                Ok(())
            }
        }
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), LinkError> {
        if self.remote_sdp.is_none() {
            debug!(
                remote = %self.remote.short(),
                buffered = self.pending_candidates.len() + 1,
                "Buffering ICE candidate until remote description is set"
            );
            self.pending_candidates.push(candidate);
            return Ok(());
        }
        if let Err(e) = self.conn.add_ice_candidate(&candidate).await {
            return Err(self.fail(e).await);
        }
        Ok(())
    }

    async fn apply_remote(&mut self, description: &SessionDescription) -> Result<(), LinkError> {
        self.conn.set_remote_description(description).await?;
        self.remote_sdp = Some(description.sdp.clone());

        let pending = std::mem::take(&mut self.pending_candidates);
        if !pending.is_empty() {
            debug!(remote = %self.remote.short(), count = pending.len(), "Flushing buffered ICE candidates");
        }
        for candidate in &pending {
            self.conn.add_ice_candidate(candidate).await?;
        }
        Ok(())
    }

    /// A locally gathered candidate, ready to publish. Nothing once closed.
    pub fn on_local_candidate(&self, candidate: IceCandidate) -> Option<SignalingEnvelope> {
        if self.state.is_closed() {
            return None;
        }
        Some(self.envelope(SignalPayload::Ice(candidate)))
    }

    async fn fail(&mut self, err: LinkError) -> LinkError {
        warn!(remote = %self.remote.short(), state = ?self.state, error = %err, "Peer link failed");
        self.close().await;
        err
    }

    /// Close the native handle and enter `Closed`. Idempotent.
    pub async fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }
        self.transition(LinkState::Closed);
        self.pending_candidates.clear();
        if let Err(e) = self.conn.close().await {
            warn!(remote = %self.remote.short(), error = %e, "Error closing native connection");
        }
    }
}
