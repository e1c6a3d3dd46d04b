//! Owner of every peer link of the active call.
//!
//! Links live in a map keyed by remote id. Membership changes create and
//! destroy them, inbound envelopes are routed to them by sender, and native
//! callbacks reach them only through [`LinkManager::on_native_event`], which
//! checks the link generation so a replaced connection can no longer touch
//! its successor.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use meshcall_net::SignalingRelay;
use meshcall_shared::protocol::{SignalPayload, SignalingEnvelope};
use meshcall_shared::{Participant, ParticipantId};

use crate::error::LinkError;
use crate::native::{NativeEvent, NativeEventKind, NativeEventSink, PeerConnectionFactory};
use crate::peer_link::{LinkState, PeerLink, Role};
use crate::router::MediaTrackRouter;

pub type LinkStates = BTreeMap<ParticipantId, LinkState>;

pub struct LinkManager {
    local: ParticipantId,
    links: HashMap<ParticipantId, PeerLink>,
    /// Remote participants currently in the roster.
    members: HashSet<ParticipantId>,
    retries: HashMap<ParticipantId, u32>,
    /// Members whose link failed more often than allowed.
    exhausted: HashSet<ParticipantId>,
    max_retries: u32,
    next_generation: u64,
    relay: Arc<dyn SignalingRelay>,
    factory: Arc<dyn PeerConnectionFactory>,
    router: Arc<MediaTrackRouter>,
    events_tx: mpsc::UnboundedSender<NativeEvent>,
    states: watch::Sender<LinkStates>,
}

impl LinkManager {
    /// Returns the manager and the receiver its native events arrive on.
    pub fn new(
        local: ParticipantId,
        relay: Arc<dyn SignalingRelay>,
        factory: Arc<dyn PeerConnectionFactory>,
        router: Arc<MediaTrackRouter>,
        max_retries: u32,
    ) -> (Self, mpsc::UnboundedReceiver<NativeEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (states, _) = watch::channel(LinkStates::new());
        let manager = Self {
            local,
            links: HashMap::new(),
            members: HashSet::new(),
            retries: HashMap::new(),
            exhausted: HashSet::new(),
            max_retries,
            next_generation: 0,
            relay,
            factory,
            router,
            events_tx,
            states,
        };
        (manager, events_rx)
    }

    pub fn local(&self) -> &ParticipantId {
        &self.local
    }

    /// State of the link to `remote`; `Closed` once retries are exhausted.
    pub fn link_state(&self, remote: &ParticipantId) -> Option<LinkState> {
        match self.links.get(remote) {
            Some(link) => Some(link.state()),
            None if self.exhausted.contains(remote) => Some(LinkState::Closed),
            None => None,
        }
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn link(&self, remote: &ParticipantId) -> Option<&PeerLink> {
        self.links.get(remote)
    }

    pub fn subscribe_states(&self) -> watch::Receiver<LinkStates> {
        self.states.subscribe()
    }

    pub async fn on_joined(&mut self, participant: &Participant) {
        let remote = &participant.user_id;
        if remote == &self.local {
            return;
        }
        self.members.insert(remote.clone());
        if !self.links.contains_key(remote) {
            self.exhausted.remove(remote);
            self.establish(remote).await;
        }
        self.publish_states();
    }

    pub async fn on_left(&mut self, remote: &ParticipantId) {
        self.members.remove(remote);
        self.retries.remove(remote);
        self.exhausted.remove(remote);
        if self.discard(remote).await {
            info!(remote = %remote.short(), "Peer link removed");
        }
        self.publish_states();
    }

    /// Close links whose remote is not in the roster, such as responder
    /// links opened on demand by a participant who has since gone.
    pub async fn retain_members(&mut self) {
        let strays: Vec<ParticipantId> = self
            .links
            .keys()
            .filter(|id| !self.members.contains(*id))
            .cloned()
            .collect();
        for remote in &strays {
            warn!(remote = %remote.short(), "Closing link to participant outside the call");
            self.discard(remote).await;
        }
        if !strays.is_empty() {
            self.publish_states();
        }
    }

    pub async fn on_envelope(&mut self, envelope: SignalingEnvelope) {
        let SignalingEnvelope { from: remote, to, payload } = envelope;
        if to != self.local || remote == self.local {
            debug!(from = %remote.short(), to = %to.short(), "Ignoring envelope not meant for us");
            return;
        }
        let kind = payload.kind();

        if let SignalPayload::Offer(offer) = &payload {
            if self
                .links
                .get(&remote)
                .is_some_and(|link| link.is_restart_offer(offer))
            {
                info!(remote = %remote.short(), "Remote restarted negotiation, replacing link");
                self.discard(&remote).await;
            }
        }

        if !self.links.contains_key(&remote) {
            let on_demand = Role::for_pair(&self.local, &remote) == Role::Responder
                && matches!(payload, SignalPayload::Offer(_) | SignalPayload::Ice(_));
            if !on_demand {
                warn!(from = %remote.short(), kind, "Dropping envelope from unresolvable participant");
                return;
            }
            debug!(remote = %remote.short(), kind, "Opening responder link on demand");
            self.exhausted.remove(&remote);
            self.establish(&remote).await;
        }

        let Some(link) = self.links.get_mut(&remote) else {
            self.publish_states();
            return;
        };

        let result = match link.handle(payload).await {
            Ok(Some(reply)) => match self.relay.publish(&reply).await {
                Ok(()) => {
                    link.on_sent();
                    Ok(())
                }
                Err(e) => Err(LinkError::from(e)),
            },
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            debug!(remote = %remote.short(), kind, "Envelope handling failed");
            self.fail(&remote, e).await;
        }
        self.publish_states();
    }

    pub async fn on_native_event(&mut self, event: NativeEvent) {
        let NativeEvent {
            remote,
            generation,
            kind,
        } = event;

        let Some(link) = self
            .links
            .get(&remote)
            .filter(|link| link.generation() == generation)
        else {
            debug!(remote = %remote.short(), generation, "Dropping event from superseded connection");
            return;
        };

        match kind {
            NativeEventKind::Candidate(candidate) => {
                if let Some(envelope) = link.on_local_candidate(candidate) {
                    if let Err(e) = self.relay.publish(&envelope).await {
                        warn!(remote = %remote.short(), error = %e, "Failed to publish local ICE candidate");
                    }
                }
            }
            NativeEventKind::Track(track) => self.router.on_remote_track(&remote, track),
            NativeEventKind::Failed(reason) => {
                self.fail(&remote, LinkError::Native(reason)).await;
                self.publish_states();
            }
        }
    }

    /// Close every link and forget the roster.
    pub async fn close_all(&mut self) {
        let count = self.links.len();
        for (_, mut link) in self.links.drain() {
            link.close().await;
        }
        self.router.clear_remote();
        self.members.clear();
        self.retries.clear();
        self.exhausted.clear();
        self.publish_states();
        info!(count, "Closed all peer links");
    }

    fn generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    async fn open_link(&mut self, remote: &ParticipantId) -> Result<(), LinkError> {
        let generation = self.generation();
        let sink = NativeEventSink::new(remote.clone(), generation, self.events_tx.clone());
        let conn = self.factory.create(remote, sink).await?;
        let mut link = PeerLink::new(self.local.clone(), remote.clone(), generation, conn);

        if let Err(e) = self.router.attach_local(link.connection()).await {
            link.close().await;
            return Err(e);
        }
        if let Some(offer) = link.start().await? {
            if let Err(e) = self.relay.publish(&offer).await {
                link.close().await;
                return Err(e.into());
            }
            link.on_sent();
        }

        info!(
            remote = %remote.short(),
            role = ?link.role(),
            generation,
            "Peer link created"
        );
        self.links.insert(remote.clone(), link);
        Ok(())
    }

    async fn establish(&mut self, remote: &ParticipantId) {
        if let Err(e) = self.open_link(remote).await {
            self.recover(remote, e).await;
        }
    }

    /// Recreate a failed link while the remote is still a member and the
    /// retry budget allows it.
    async fn recover(&mut self, remote: &ParticipantId, mut err: LinkError) {
        self.router.remove(remote);
        loop {
            if !self.members.contains(remote) {
                debug!(remote = %remote.short(), error = %err, "Not recreating link to non-member");
                return;
            }
            let attempts = self.retries.entry(remote.clone()).or_insert(0);
            if *attempts >= self.max_retries {
                warn!(remote = %remote.short(), attempts = *attempts, error = %err, "Giving up on peer link");
                self.exhausted.insert(remote.clone());
                return;
            }
            *attempts += 1;
            let attempt = *attempts;

            info!(remote = %remote.short(), attempt, error = %err, "Recreating peer link");
            match self.open_link(remote).await {
                Ok(()) => return,
                Err(e) => err = e,
            }
        }
    }

    async fn fail(&mut self, remote: &ParticipantId, err: LinkError) {
        if let Some(mut link) = self.links.remove(remote) {
            link.close().await;
        }
        self.recover(remote, err).await;
    }

    /// Close and drop the link to `remote` and release its stream.
    async fn discard(&mut self, remote: &ParticipantId) -> bool {
        self.router.remove(remote);
        match self.links.remove(remote) {
            Some(mut link) => {
                link.close().await;
                true
            }
            None => false,
        }
    }

    fn publish_states(&self) {
        let mut states: LinkStates = self
            .links
            .iter()
            .map(|(id, link)| (id.clone(), link.state()))
            .collect();
        for id in &self.exhausted {
            states.entry(id.clone()).or_insert(LinkState::Closed);
        }
        self.states.send_if_modified(|current| {
            if *current == states {
                return false;
            }
            *current = states;
            true
        });
    }
}
