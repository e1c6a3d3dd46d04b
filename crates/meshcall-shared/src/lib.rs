//! # meshcall-shared
//!
//! Types shared by every meshcall crate: participant and call identifiers,
//! the call/participant data model, the signaling envelope and its wire
//! codec, and the [`directory::CallDirectory`] boundary through which the
//! core reads call membership from external storage.

pub mod api;
pub mod constants;
pub mod directory;
pub mod error;
pub mod models;
pub mod protocol;
pub mod types;

pub use directory::CallDirectory;
pub use error::{DirectoryError, ProtocolError};
pub use models::{CallSession, Participant, Profile};
pub use protocol::{IceCandidate, SessionDescription, SignalPayload, SignalingEnvelope};
pub use types::{CallId, ChatId, ParticipantId};
