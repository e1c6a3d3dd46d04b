//! Port to the native peer-connection implementation.
//!
//! The link manager only sees [`PeerConnection`] handles. Native callbacks
//! (local candidates, remote tracks, transport failure) never touch a link
//! directly: they are posted as [`NativeEvent`]s tagged with the remote id and
//! the link generation, and the manager looks the link up itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use meshcall_shared::protocol::{IceCandidate, SessionDescription};
use meshcall_shared::types::ParticipantId;

use crate::error::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// A local capture track, shared read-only by every peer link.
///
/// Clones share the same enabled flag, so muting one clone mutes the track on
/// every link at once.
#[derive(Clone)]
pub struct LocalTrack {
    id: String,
    kind: TrackKind,
    enabled: Arc<AtomicBool>,
    rtc: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, id: impl Into<String>, stream_id: impl Into<String>) -> Self {
        let id = id.into();
        let capability = match kind {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48_000,
                channels: 2,
                ..Default::default()
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90_000,
                ..Default::default()
            },
        };
        let rtc = Arc::new(TrackLocalStaticSample::new(capability, id.clone(), stream_id.into()));
        Self {
            id,
            kind,
            enabled: Arc::new(AtomicBool::new(true)),
            rtc,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn rtc(&self) -> &Arc<TrackLocalStaticSample> {
        &self.rtc
    }

    /// Push one encoded media sample to every link carrying this track.
    ///
    /// Samples written while the track is disabled are dropped.
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<(), LinkError> {
        if !self.is_enabled() {
            trace!(track = %self.id, "Track disabled, dropping sample");
            return Ok(());
        }
        self.rtc
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await
            .map_err(|e| LinkError::Native(e.to_string()))
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// An inbound track announced by a remote participant.
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    /// Native track to read RTP from; absent for tracks produced in tests.
    pub rtc: Option<Arc<TrackRemote>>,
}

impl RemoteTrack {
    pub fn new(id: impl Into<String>, stream_id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            stream_id: stream_id.into(),
            kind,
            rtc: None,
        }
    }
}

impl std::fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum NativeEventKind {
    /// A locally gathered connectivity candidate.
    Candidate(IceCandidate),
    /// Remote media arrived.
    Track(RemoteTrack),
    /// The transport failed or was closed by the remote side.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct NativeEvent {
    pub remote: ParticipantId,
    pub generation: u64,
    pub kind: NativeEventKind,
}

/// Handed to the factory for each connection; posts that connection's
/// callbacks to the coordinator.
#[derive(Debug, Clone)]
pub struct NativeEventSink {
    remote: ParticipantId,
    generation: u64,
    tx: mpsc::UnboundedSender<NativeEvent>,
}

impl NativeEventSink {
    pub fn new(
        remote: ParticipantId,
        generation: u64,
        tx: mpsc::UnboundedSender<NativeEvent>,
    ) -> Self {
        Self {
            remote,
            generation,
            tx,
        }
    }

    pub fn remote(&self) -> &ParticipantId {
        &self.remote
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn candidate(&self, candidate: IceCandidate) {
        self.post(NativeEventKind::Candidate(candidate));
    }

    pub fn track(&self, track: RemoteTrack) {
        self.post(NativeEventKind::Track(track));
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.post(NativeEventKind::Failed(reason.into()));
    }

    fn post(&self, kind: NativeEventKind) {
        // The coordinator is gone once the call has been left.
        let _ = self.tx.send(NativeEvent {
            remote: self.remote.clone(),
            generation: self.generation,
            kind,
        });
    }
}

/// One native peer connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn add_track(&self, track: &LocalTrack) -> Result<(), LinkError>;

    /// Create an offer and install it as the local description.
    async fn create_offer(&self) -> Result<SessionDescription, LinkError>;

    /// Create an answer and install it as the local description.
    async fn create_answer(&self) -> Result<SessionDescription, LinkError>;

    async fn set_remote_description(&self, description: &SessionDescription)
        -> Result<(), LinkError>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), LinkError>;

    async fn close(&self) -> Result<(), LinkError>;
}

#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        remote: &ParticipantId,
        events: NativeEventSink,
    ) -> Result<Arc<dyn PeerConnection>, LinkError>;
}
