//! # meshcall-media
//!
//! Full-mesh call core: membership tracking, one negotiation state machine
//! per remote participant, the link manager that owns them, local/remote
//! media bookkeeping and the [`CallController`] a UI drives.

pub mod call;
pub mod capture;
pub mod config;
pub mod error;
pub mod link_manager;
pub mod membership;
pub mod native;
pub mod peer_link;
pub mod router;
pub mod rtc;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use call::{CallController, CallDeps};
pub use capture::{acquire_local_tracks, CpalDeviceProbe, DeviceProbe};
pub use config::{CallConfig, CaptureConfig};
pub use error::{CallError, CaptureError, LinkError};
pub use link_manager::{LinkManager, LinkStates};
pub use membership::{MembershipEvent, MembershipRegistry};
pub use native::{
    LocalTrack, NativeEvent, NativeEventKind, NativeEventSink, PeerConnection,
    PeerConnectionFactory, RemoteTrack, TrackKind,
};
pub use peer_link::{LinkState, PeerLink, Role};
pub use router::{LocalStream, MediaStream, MediaTrackRouter, RemoteStreams};
pub use rtc::RtcConnectionFactory;
pub use tracker::ConnectionTracker;
