//! Call lifecycle: `join → active → leave`.
//!
//! Everything that happens inside a call runs on one tokio task. Membership
//! polls, relay envelopes and native events are handled strictly one at a
//! time in arrival order, so links need no locks of their own. The UI talks
//! to the task through [`CallController`] and observes it through watch
//! channels.
//!
//! Leaving interrupts whatever the task is doing, including a native offer or
//! answer that never completes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use meshcall_net::{RelaySubscription, SignalingRelay};
use meshcall_shared::constants::MAX_POLL_BACKOFF_MS;
use meshcall_shared::{CallDirectory, CallId, ParticipantId, SignalingEnvelope};

use crate::capture::{acquire_local_tracks, DeviceProbe};
use crate::config::CallConfig;
use crate::error::{CallError, CaptureError};
use crate::link_manager::{LinkManager, LinkStates};
use crate::membership::{MembershipEvent, MembershipRegistry};
use crate::native::{NativeEvent, PeerConnectionFactory};
use crate::peer_link::LinkState;
use crate::router::{LocalStream, MediaTrackRouter, RemoteStreams};
use crate::tracker::ConnectionTracker;

/// Collaborators a controller needs.
#[derive(Clone)]
pub struct CallDeps {
    pub directory: Arc<dyn CallDirectory>,
    pub relay: Arc<dyn SignalingRelay>,
    pub connections: Arc<dyn PeerConnectionFactory>,
    pub devices: Arc<dyn DeviceProbe>,
}

#[derive(Debug)]
enum CallCommand {
    /// Poll membership now instead of waiting for the next tick.
    Refresh,
}

/// What woke the coordinator up.
enum Wakeup {
    Command(CallCommand),
    Native(NativeEvent),
    /// `None` once the relay closed the subscription.
    Envelope(Option<SignalingEnvelope>),
    Poll,
}

struct ActiveCall {
    call_id: CallId,
    shutdown: oneshot::Sender<()>,
    commands: mpsc::Sender<CallCommand>,
    states: watch::Receiver<LinkStates>,
    task: JoinHandle<()>,
}

pub struct CallController {
    local: ParticipantId,
    config: CallConfig,
    deps: CallDeps,
    router: Arc<MediaTrackRouter>,
    capture_error: Option<CaptureError>,
    active: Option<ActiveCall>,
}

impl CallController {
    pub fn new(local: ParticipantId, config: CallConfig, deps: CallDeps) -> Self {
        Self {
            local,
            config,
            deps,
            router: Arc::new(MediaTrackRouter::new()),
            capture_error: None,
            active: None,
        }
    }

    pub fn local(&self) -> &ParticipantId {
        &self.local
    }

    pub fn call_id(&self) -> Option<&CallId> {
        self.active.as_ref().map(|a| &a.call_id)
    }

    pub fn is_in_call(&self) -> bool {
        self.active.is_some()
    }

    /// Enter a call: subscribe to signaling, add our participant row and
    /// start the coordinator task.
    ///
    /// A missing capture device does not fail the join; the call continues
    /// receive-only and the error is available from
    /// [`capture_error`](Self::capture_error).
    pub async fn join(&mut self, call_id: &CallId) -> Result<(), CallError> {
        if let Some(active) = &self.active {
            return Err(CallError::AlreadyInCall(active.call_id.to_string()));
        }

        let (tracks, capture_error) =
            acquire_local_tracks(self.deps.devices.as_ref(), &self.config.capture, &self.local);
        if let Some(e) = &capture_error {
            warn!(call = %call_id, error = %e, "Joining receive-only");
        }
        self.capture_error = capture_error;
        self.router.set_local_tracks(tracks);

        // Subscribe before announcing ourselves, so no offer sent in reaction
        // to our directory row can be missed.
        let subscription = self.deps.relay.subscribe(&self.local).await?;
        if let Err(e) = self.deps.directory.join(call_id, &self.local).await {
            if let Err(unsub) = self.deps.relay.unsubscribe().await {
                warn!(error = %unsub, "Failed to unsubscribe after aborted join");
            }
            self.router.set_local_tracks(Vec::new());
            return Err(e.into());
        }

        let connections = ConnectionTracker::new(self.deps.connections.clone());
        let (manager, native_events) = LinkManager::new(
            self.local.clone(),
            self.deps.relay.clone(),
            connections.clone(),
            self.router.clone(),
            self.config.max_link_retries,
        );
        let states = manager.subscribe_states();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (commands_tx, commands_rx) = mpsc::channel(8);

        let task = CallTask {
            call_id: call_id.clone(),
            local: self.local.clone(),
            poll_interval: self.config.poll_interval,
            backoff: self.config.poll_interval,
            next_poll: Instant::now(),
            relay: self.deps.relay.clone(),
            connections,
            registry: MembershipRegistry::new(call_id.clone(), self.deps.directory.clone()),
            manager,
            subscription: Some(subscription),
            native_events,
            commands: commands_rx,
        };
        let handle = tokio::spawn(task.run(shutdown_rx));

        info!(call = %call_id, local = %self.local.short(), "Joined call");
        self.active = Some(ActiveCall {
            call_id: call_id.clone(),
            shutdown: shutdown_tx,
            commands: commands_tx,
            states,
            task: handle,
        });
        Ok(())
    }

    /// Leave the call. Every native connection is closed and the relay
    /// subscription torn down before this returns, even if a link is stuck
    /// in the middle of negotiation.
    pub async fn leave(&mut self, call_id: &CallId) -> Result<(), CallError> {
        if self.call_id() != Some(call_id) {
            return Err(CallError::NotInCall);
        }
        let Some(active) = self.active.take() else {
            return Err(CallError::NotInCall);
        };

        let _ = active.shutdown.send(());
        if let Err(e) = active.task.await {
            warn!(call = %call_id, error = %e, "Call task ended abnormally");
        }
        self.router.clear_remote();
        self.router.set_local_tracks(Vec::new());

        if let Err(e) = self.deps.directory.leave(call_id, &self.local).await {
            warn!(call = %call_id, error = %e, "Failed to remove participant row");
        }
        info!(call = %call_id, local = %self.local.short(), "Left call");
        Ok(())
    }

    /// Ask the coordinator to poll membership right away.
    pub async fn refresh(&self) -> Result<(), CallError> {
        let active = self.active.as_ref().ok_or(CallError::NotInCall)?;
        active
            .commands
            .send(CallCommand::Refresh)
            .await
            .map_err(|_| CallError::NotInCall)
    }

    pub fn remote_streams(&self) -> RemoteStreams {
        self.router.remote_streams()
    }

    pub fn subscribe_remote_streams(&self) -> watch::Receiver<RemoteStreams> {
        self.router.subscribe()
    }

    pub fn local_stream(&self) -> LocalStream {
        self.router.local_stream()
    }

    pub fn link_state(&self, participant: &ParticipantId) -> Option<LinkState> {
        let active = self.active.as_ref()?;
        let state = active.states.borrow().get(participant).copied();
        state
    }

    pub fn link_states(&self) -> LinkStates {
        self.active
            .as_ref()
            .map(|a| a.states.borrow().clone())
            .unwrap_or_default()
    }

    pub fn subscribe_link_states(&self) -> Option<watch::Receiver<LinkStates>> {
        self.active.as_ref().map(|a| a.states.clone())
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        self.router.set_audio_enabled(enabled);
    }

    pub fn set_video_enabled(&self, enabled: bool) {
        self.router.set_video_enabled(enabled);
    }

    /// Capture failure reported at the last join, if any.
    pub fn capture_error(&self) -> Option<&CaptureError> {
        self.capture_error.as_ref()
    }
}

/// State owned by the coordinator task of one call.
struct CallTask {
    call_id: CallId,
    local: ParticipantId,
    poll_interval: Duration,
    backoff: Duration,
    next_poll: Instant,
    relay: Arc<dyn SignalingRelay>,
    /// Every connection the manager created, linked or not.
    connections: Arc<ConnectionTracker>,
    registry: MembershipRegistry,
    manager: LinkManager,
    /// `None` while the relay is unreachable.
    subscription: Option<RelaySubscription>,
    native_events: mpsc::UnboundedReceiver<NativeEvent>,
    commands: mpsc::Receiver<CallCommand>,
}

impl CallTask {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        loop {
            let wakeup = tokio::select! {
                biased;

                _ = &mut shutdown => break,

                Some(command) = self.commands.recv() => Wakeup::Command(command),

                Some(event) = self.native_events.recv() => Wakeup::Native(event),

                envelope = recv_envelope(&mut self.subscription), if self.subscription.is_some() => {
                    Wakeup::Envelope(envelope)
                }

                _ = sleep_until(self.next_poll) => Wakeup::Poll,
            };

            // Native calls inside a handler may never return.
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                _ = self.handle(wakeup) => {}
            }
        }

        // Queued envelopes and events are dropped with the task.
        self.manager.close_all().await;
        let stray = self.connections.close_all().await;
        if stray > 0 {
            info!(call = %self.call_id, count = stray, "Closed connections interrupted mid-negotiation");
        }
        self.registry.clear();
        drop(self.subscription.take());
        if let Err(e) = self.relay.unsubscribe().await {
            warn!(call = %self.call_id, error = %e, "Failed to unsubscribe from signaling relay");
        }
        debug!(call = %self.call_id, "Call task finished");
    }

    async fn handle(&mut self, wakeup: Wakeup) {
        match wakeup {
            Wakeup::Command(CallCommand::Refresh) => self.next_poll = Instant::now(),
            Wakeup::Native(event) => self.manager.on_native_event(event).await,
            Wakeup::Envelope(Some(envelope)) => self.manager.on_envelope(envelope).await,
            Wakeup::Envelope(None) => {
                warn!(call = %self.call_id, "Signaling relay closed, resubscribing on next poll");
                self.subscription = None;
            }
            Wakeup::Poll => {
                let healthy = self.tick().await;
                self.backoff = if healthy {
                    self.poll_interval
                } else {
                    (self.backoff * 2).min(Duration::from_millis(MAX_POLL_BACKOFF_MS))
                };
                self.next_poll = Instant::now() + self.backoff;
            }
        }
    }

    /// One membership poll; also retries a lost relay subscription.
    /// Returns whether both are healthy.
    async fn tick(&mut self) -> bool {
        let mut healthy = true;

        if self.subscription.is_none() {
            match self.relay.subscribe(&self.local).await {
                Ok(subscription) => {
                    info!(call = %self.call_id, "Signaling relay subscription restored");
                    self.subscription = Some(subscription);
                }
                Err(e) => {
                    warn!(call = %self.call_id, error = %e, "Signaling relay unreachable");
                    healthy = false;
                }
            }
        }

        match self.registry.poll().await {
            Ok(events) => {
                for event in events {
                    match event {
                        MembershipEvent::Joined(p) => self.manager.on_joined(&p).await,
                        MembershipEvent::Left(p) => self.manager.on_left(&p.user_id).await,
                    }
                }
                self.manager.retain_members().await;
            }
            Err(e) => {
                warn!(call = %self.call_id, error = %e, transient = e.is_transient(), "Membership poll failed");
                healthy = false;
            }
        }
        healthy
    }
}

async fn recv_envelope(subscription: &mut Option<RelaySubscription>) -> Option<SignalingEnvelope> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}
