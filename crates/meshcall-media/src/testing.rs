//! In-memory fakes for the native connection, the call directory and the
//! capture devices.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use meshcall_shared::protocol::{IceCandidate, SessionDescription};
use meshcall_shared::{
    CallDirectory, CallId, CallSession, ChatId, DirectoryError, Participant, ParticipantId,
};

use crate::capture::DeviceProbe;
use crate::error::{CaptureError, LinkError};
use crate::native::{
    LocalTrack, NativeEventSink, PeerConnection, PeerConnectionFactory, RemoteTrack, TrackKind,
};

#[derive(Default)]
struct MockState {
    remote_descriptions: usize,
    remote_set: bool,
    candidates: Vec<IceCandidate>,
    tracks: Vec<String>,
    close_calls: usize,
    reject_remote: bool,
}

/// Records every call. A local description lists the attached tracks and
/// gathers one candidate; setting a remote description makes each track the
/// remote listed "arrive", so a receive-only remote delivers nothing.
pub struct MockConnection {
    local: ParticipantId,
    remote: ParticipantId,
    sink: Option<NativeEventSink>,
    state: Mutex<MockState>,
    stall_negotiation: bool,
}

impl MockConnection {
    fn new(
        local: ParticipantId,
        remote: ParticipantId,
        sink: Option<NativeEventSink>,
        stall_negotiation: bool,
    ) -> Self {
        Self {
            local,
            remote,
            sink,
            state: Mutex::new(MockState::default()),
            stall_negotiation,
        }
    }

    /// A connection whose native events go nowhere.
    pub fn detached(local: &str, remote: &str) -> Arc<Self> {
        Arc::new(Self::new(local.into(), remote.into(), None, false))
    }

    pub fn remote(&self) -> &ParticipantId {
        &self.remote
    }

    pub fn generation(&self) -> u64 {
        self.sink.as_ref().map(|s| s.generation()).unwrap_or(0)
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().unwrap().candidates.clone()
    }

    pub fn tracks(&self) -> Vec<String> {
        self.state.lock().unwrap().tracks.clone()
    }

    pub fn remote_descriptions(&self) -> usize {
        self.state.lock().unwrap().remote_descriptions
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().unwrap().close_calls
    }

    pub fn is_closed(&self) -> bool {
        self.close_calls() > 0
    }

    pub fn reject_remote_descriptions(&self) {
        self.state.lock().unwrap().reject_remote = true;
    }

    /// Simulate the transport dying underneath the link.
    pub fn fail_transport(&self) {
        if let Some(sink) = &self.sink {
            sink.failed("transport failed");
        }
    }

    fn description(&self, kind: &str) -> String {
        format!(
            "v=0 {kind} {}->{} gen {} tracks {}",
            self.local,
            self.remote,
            self.generation(),
            self.tracks().join(",")
        )
    }

    async fn negotiate(&self) {
        if self.stall_negotiation {
            std::future::pending::<()>().await;
        }
        self.gather();
    }

    fn gather(&self) {
        if let Some(sink) = &self.sink {
            sink.candidate(IceCandidate::new(format!(
                "candidate:1 1 udp 1 {} 5000 typ host",
                self.local
            )));
        }
    }
}

#[async_trait]
impl PeerConnection for MockConnection {
    async fn add_track(&self, track: &LocalTrack) -> Result<(), LinkError> {
        self.state.lock().unwrap().tracks.push(track.id().to_string());
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, LinkError> {
        self.negotiate().await;
        Ok(SessionDescription::offer(self.description("offer")))
    }

    async fn create_answer(&self) -> Result<SessionDescription, LinkError> {
        self.negotiate().await;
        Ok(SessionDescription::answer(self.description("answer")))
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), LinkError> {
        {
            let mut state = self.state.lock().unwrap();
            if state.reject_remote {
                return Err(LinkError::InvalidDescription("rejected by mock".into()));
            }
            state.remote_descriptions += 1;
            state.remote_set = true;
        }
        if let Some(sink) = &self.sink {
            for track in listed_tracks(&description.sdp) {
                sink.track(track);
            }
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), LinkError> {
        let mut state = self.state.lock().unwrap();
        if !state.remote_set {
            return Err(LinkError::InvalidCandidate("no remote description".into()));
        }
        state.candidates.push(candidate.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.state.lock().unwrap().close_calls += 1;
        Ok(())
    }
}

/// Remote tracks announced by a mock description's `tracks` list.
fn listed_tracks(sdp: &str) -> Vec<RemoteTrack> {
    let Some((head, list)) = sdp.split_once(" tracks ") else {
        return Vec::new();
    };
    let stream = head
        .split_whitespace()
        .find_map(|word| word.split_once("->").map(|(from, _)| from))
        .unwrap_or_default();
    list.split(',')
        .filter_map(|id| {
            let kind = match id.split('-').next() {
                Some("audio") => TrackKind::Audio,
                Some("video") => TrackKind::Video,
                _ => return None,
            };
            Some(RemoteTrack::new(id, stream, kind))
        })
        .collect()
}

pub struct MockFactory {
    local: ParticipantId,
    connections: Mutex<Vec<Arc<MockConnection>>>,
    failing_creates: AtomicUsize,
    stall_negotiation: AtomicBool,
}

impl MockFactory {
    pub fn new(local: &str) -> Arc<Self> {
        Arc::new(Self {
            local: local.into(),
            connections: Mutex::new(Vec::new()),
            failing_creates: AtomicUsize::new(0),
            stall_negotiation: AtomicBool::new(false),
        })
    }

    /// Make the next `n` creations fail.
    pub fn fail_next(&self, n: usize) {
        self.failing_creates.store(n, Ordering::SeqCst);
    }

    /// Connections created from now on never finish an offer or answer.
    pub fn stall_negotiation(&self) {
        self.stall_negotiation.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// Every connection ever created towards `remote`, oldest first.
    pub fn connections_to(&self, remote: &str) -> Vec<Arc<MockConnection>> {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.remote().as_str() == remote)
            .cloned()
            .collect()
    }

    pub fn latest_to(&self, remote: &str) -> Option<Arc<MockConnection>> {
        self.connections_to(remote).pop()
    }

    pub fn all(&self) -> Vec<Arc<MockConnection>> {
        self.connections.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerConnectionFactory for MockFactory {
    async fn create(
        &self,
        remote: &ParticipantId,
        events: NativeEventSink,
    ) -> Result<Arc<dyn PeerConnection>, LinkError> {
        let failing = self
            .failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(LinkError::Native("mock create failure".into()));
        }
        let conn = Arc::new(MockConnection::new(
            self.local.clone(),
            remote.clone(),
            Some(events),
            self.stall_negotiation.load(Ordering::SeqCst),
        ));
        self.connections.lock().unwrap().push(conn.clone());
        Ok(conn)
    }
}

/// Call directory held in memory.
#[derive(Default)]
pub struct MockDirectory {
    calls: Mutex<HashMap<CallId, Vec<Participant>>>,
    unavailable: AtomicBool,
    fetches: AtomicUsize,
}

impl MockDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn members(&self, call_id: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .get(&CallId::from(call_id))
            .map(|ps| ps.iter().map(|p| p.user_id.to_string()).collect())
            .unwrap_or_default()
    }

    /// Insert a member row directly, bypassing any controller.
    pub fn add_member(&self, call_id: &str, user: &str) {
        let mut calls = self.calls.lock().unwrap();
        let members = calls.entry(CallId::from(call_id)).or_default();
        if !members.iter().any(|p| p.user_id.as_str() == user) {
            members.push(Participant::new(user));
        }
    }

    pub fn remove_member(&self, call_id: &str, user: &str) {
        if let Some(members) = self.calls.lock().unwrap().get_mut(&CallId::from(call_id)) {
            members.retain(|p| p.user_id.as_str() != user);
        }
    }

    fn check(&self) -> Result<(), DirectoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("mock directory offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CallDirectory for MockDirectory {
    async fn participants(&self, call_id: &CallId) -> Result<Vec<Participant>, DirectoryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self
            .calls
            .lock()
            .unwrap()
            .get(call_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_call(
        &self,
        chat_id: &ChatId,
        creator: &ParticipantId,
    ) -> Result<CallSession, DirectoryError> {
        self.check()?;
        let call = CallSession {
            id: CallId::generate(),
            chat_id: chat_id.clone(),
            created_by: creator.clone(),
            created_at: Utc::now(),
        };
        self.add_member(call.id.as_str(), creator.as_str());
        Ok(call)
    }

    async fn join(&self, call_id: &CallId, user: &ParticipantId) -> Result<(), DirectoryError> {
        self.check()?;
        self.add_member(call_id.as_str(), user.as_str());
        Ok(())
    }

    async fn leave(&self, call_id: &CallId, user: &ParticipantId) -> Result<(), DirectoryError> {
        self.check()?;
        self.remove_member(call_id.as_str(), user.as_str());
        Ok(())
    }

    async fn calls_for(&self, _user: &ParticipantId) -> Result<Vec<CallSession>, DirectoryError> {
        self.check()?;
        Ok(Vec::new())
    }
}

/// Device probe with fixed answers.
pub struct StaticProbe {
    audio: bool,
    video: bool,
}

impl StaticProbe {
    pub fn new(audio: bool, video: bool) -> Self {
        Self { audio, video }
    }
}

impl DeviceProbe for StaticProbe {
    fn probe(&self, kind: TrackKind) -> Result<(), CaptureError> {
        match kind {
            TrackKind::Audio if !self.audio => Err(CaptureError::NoInputDevice),
            TrackKind::Video if !self.video => Err(CaptureError::NoCamera),
            _ => Ok(()),
        }
    }
}

/// Poll `condition` until it holds, panicking after a few seconds.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
