//! Local and remote media bookkeeping.
//!
//! The router owns the shared local track set and the per-participant map of
//! inbound tracks. The remote map is published through a watch channel so a
//! UI can react the moment a stream appears or disappears.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use tokio::sync::watch;
use tracing::{debug, info};

use meshcall_shared::types::ParticipantId;

use crate::error::LinkError;
use crate::native::{LocalTrack, PeerConnection, RemoteTrack, TrackKind};

/// Inbound tracks of one remote participant.
#[derive(Debug, Clone)]
pub struct MediaStream {
    pub participant: ParticipantId,
    pub tracks: Vec<RemoteTrack>,
}

impl MediaStream {
    pub fn has_kind(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }
}

pub type RemoteStreams = BTreeMap<ParticipantId, MediaStream>;

/// The local capture tracks as seen by the UI.
#[derive(Debug, Clone, Default)]
pub struct LocalStream {
    pub tracks: Vec<LocalTrack>,
}

impl LocalStream {
    pub fn track(&self, kind: TrackKind) -> Option<&LocalTrack> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }
}

pub struct MediaTrackRouter {
    local: RwLock<Vec<LocalTrack>>,
    audio_enabled: AtomicBool,
    video_enabled: AtomicBool,
    remote: watch::Sender<RemoteStreams>,
}

impl Default for MediaTrackRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaTrackRouter {
    pub fn new() -> Self {
        let (remote, _) = watch::channel(RemoteStreams::new());
        Self {
            local: RwLock::new(Vec::new()),
            audio_enabled: AtomicBool::new(true),
            video_enabled: AtomicBool::new(true),
            remote,
        }
    }

    /// Replace the local track set. Tracks follow the current mute toggles.
    pub fn set_local_tracks(&self, tracks: Vec<LocalTrack>) {
        for track in &tracks {
            track.set_enabled(self.kind_enabled(track.kind()));
        }
        debug!(count = tracks.len(), "Local tracks set");
        *self.local.write().unwrap_or_else(|e| e.into_inner()) = tracks;
    }

    pub fn local_stream(&self) -> LocalStream {
        LocalStream {
            tracks: self.local.read().unwrap_or_else(|e| e.into_inner()).clone(),
        }
    }

    /// Add every local track to a freshly created connection.
    pub async fn attach_local(&self, conn: &dyn PeerConnection) -> Result<(), LinkError> {
        let tracks = self.local_stream().tracks;
        for track in &tracks {
            conn.add_track(track).await?;
        }
        Ok(())
    }

    /// Record an inbound track. A track id already known for that
    /// participant replaces the old entry.
    pub fn on_remote_track(&self, remote: &ParticipantId, track: RemoteTrack) {
        info!(remote = %remote.short(), kind = %track.kind, "Remote track attached");
        self.remote.send_modify(|streams| {
            let stream = streams
                .entry(remote.clone())
                .or_insert_with(|| MediaStream {
                    participant: remote.clone(),
                    tracks: Vec::new(),
                });
            stream.tracks.retain(|t| t.id != track.id);
            stream.tracks.push(track);
        });
    }

    /// Release the inbound stream of a participant. Returns whether one existed.
    pub fn remove(&self, remote: &ParticipantId) -> bool {
        let removed = self
            .remote
            .send_if_modified(|streams| streams.remove(remote).is_some());
        if removed {
            debug!(remote = %remote.short(), "Remote stream released");
        }
        removed
    }

    pub fn clear_remote(&self) {
        self.remote.send_if_modified(|streams| {
            let had = !streams.is_empty();
            streams.clear();
            had
        });
    }

    pub fn remote_streams(&self) -> RemoteStreams {
        self.remote.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RemoteStreams> {
        self.remote.subscribe()
    }

    /// Global microphone toggle. Not renegotiated, not signaled.
    pub fn set_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::SeqCst);
        self.apply(TrackKind::Audio, enabled);
    }

    /// Global camera toggle. Not renegotiated, not signaled.
    pub fn set_video_enabled(&self, enabled: bool) {
        self.video_enabled.store(enabled, Ordering::SeqCst);
        self.apply(TrackKind::Video, enabled);
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::Relaxed)
    }

    pub fn is_video_enabled(&self) -> bool {
        self.video_enabled.load(Ordering::Relaxed)
    }

    fn kind_enabled(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.is_audio_enabled(),
            TrackKind::Video => self.is_video_enabled(),
        }
    }

    fn apply(&self, kind: TrackKind, enabled: bool) {
        let local = self.local.read().unwrap_or_else(|e| e.into_inner());
        for track in local.iter().filter(|t| t.kind() == kind) {
            track.set_enabled(enabled);
        }
        debug!(kind = %kind, enabled, "Local track toggle");
    }
}
