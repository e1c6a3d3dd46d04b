//! webrtc-rs implementation of the native peer-connection port.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use meshcall_shared::protocol::{IceCandidate, SdpKind, SessionDescription};
use meshcall_shared::types::ParticipantId;

use crate::config::CallConfig;
use crate::error::LinkError;
use crate::native::{
    LocalTrack, NativeEventSink, PeerConnection, PeerConnectionFactory, RemoteTrack, TrackKind,
};

fn native(e: webrtc::Error) -> LinkError {
    LinkError::Native(e.to_string())
}

/// Builds webrtc-rs peer connections sharing one media engine.
pub struct RtcConnectionFactory {
    api: API,
    ice_servers: Vec<RTCIceServer>,
}

impl RtcConnectionFactory {
    pub fn new(ice_urls: &[String]) -> Result<Self, LinkError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(native)?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(native)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api,
            ice_servers: ice_servers(ice_urls),
        })
    }

    pub fn from_config(config: &CallConfig) -> Result<Self, LinkError> {
        Self::new(&config.ice_servers)
    }
}

fn ice_servers(urls: &[String]) -> Vec<RTCIceServer> {
    if urls.is_empty() {
        return Vec::new();
    }
    vec![RTCIceServer {
        urls: urls.to_vec(),
        ..Default::default()
    }]
}

fn track_kind(kind: RTPCodecType) -> TrackKind {
    match kind {
        RTPCodecType::Video => TrackKind::Video,
        _ => TrackKind::Audio,
    }
}

fn remote_track(track: Arc<TrackRemote>) -> RemoteTrack {
    RemoteTrack {
        id: track.id(),
        stream_id: track.stream_id(),
        kind: track_kind(track.kind()),
        rtc: Some(track),
    }
}

fn candidate_from_init(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn candidate_to_init(candidate: &IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate.clone(),
        sdp_mid: candidate.sdp_mid.clone(),
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: candidate.username_fragment.clone(),
    }
}

#[async_trait]
impl PeerConnectionFactory for RtcConnectionFactory {
    async fn create(
        &self,
        remote: &ParticipantId,
        events: NativeEventSink,
    ) -> Result<Arc<dyn PeerConnection>, LinkError> {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };
        let pc = Arc::new(self.api.new_peer_connection(config).await.map_err(native)?);

        let sink = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let sink = sink.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => sink.candidate(candidate_from_init(init)),
                    Err(e) => warn!(error = %e, "Failed to serialize local ICE candidate"),
                }
            })
        }));

        let sink = events.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let sink = sink.clone();
            Box::pin(async move {
                debug!(
                    remote = %sink.remote().short(),
                    kind = %track.kind(),
                    ssrc = track.ssrc(),
                    "Remote track arrived"
                );
                sink.track(remote_track(track));
            })
        }));

        let sink = events;
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let sink = sink.clone();
            Box::pin(async move {
                match state {
                    RTCPeerConnectionState::Connected => {
                        info!(remote = %sink.remote().short(), "Media transport connected");
                    }
                    RTCPeerConnectionState::Disconnected => {
                        warn!(remote = %sink.remote().short(), "Media transport disconnected");
                    }
                    RTCPeerConnectionState::Failed => sink.failed("media transport failed"),
                    _ => {}
                }
            })
        }));

        debug!(remote = %remote.short(), "Created native peer connection");
        Ok(Arc::new(RtcPeerConnection { pc }))
    }
}

pub struct RtcPeerConnection {
    pc: Arc<RTCPeerConnection>,
}

impl RtcPeerConnection {
    /// Add a receive-only transceiver for every media kind no local track
    /// covers, so the offer still has a section the remote can send into.
    async fn receive_missing_kinds(&self) -> Result<(), LinkError> {
        let transceivers = self.pc.get_transceivers().await;
        for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
            if transceivers.iter().any(|t| t.kind() == kind) {
                continue;
            }
            let init = RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Recvonly,
                send_encodings: Vec::new(),
            };
            self.pc
                .add_transceiver_from_kind(kind, Some(init))
                .await
                .map_err(native)?;
            debug!(kind = ?kind, "Added receive-only transceiver");
        }
        Ok(())
    }
}

#[async_trait]
impl PeerConnection for RtcPeerConnection {
    async fn add_track(&self, track: &LocalTrack) -> Result<(), LinkError> {
        let local: Arc<dyn TrackLocal + Send + Sync> = track.rtc().clone();
        let sender = self.pc.add_track(local).await.map_err(native)?;

        // Drain RTCP so the interceptors keep running.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, LinkError> {
        self.receive_missing_kinds().await?;
        let offer = self.pc.create_offer(None).await.map_err(native)?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(native)?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, LinkError> {
        let answer = self.pc.create_answer(None).await.map_err(native)?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(native)?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), LinkError> {
        let sdp = description.sdp.clone();
        let desc = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp),
            SdpKind::Answer => RTCSessionDescription::answer(sdp),
        }
        .map_err(|e| LinkError::InvalidDescription(e.to_string()))?;

        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| LinkError::InvalidDescription(e.to_string()))
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), LinkError> {
        self.pc
            .add_ice_candidate(candidate_to_init(candidate))
            .await
            .map_err(|e| LinkError::InvalidCandidate(e.to_string()))
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.pc.close().await.map_err(native)
    }
}
