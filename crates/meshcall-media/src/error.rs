use thiserror::Error;

use meshcall_net::RelayError;
use meshcall_shared::DirectoryError;

/// Failures of a single peer link. Any of them closes that link only.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("WebRTC error: {0}")]
    Native(String),

    #[error("Invalid session description: {0}")]
    InvalidDescription(String),

    #[error("Invalid ICE candidate: {0}")]
    InvalidCandidate(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Signaling failed: {0}")]
    Signaling(#[from] RelayError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("No input device available")]
    NoInputDevice,

    #[error("No camera available")]
    NoCamera,

    #[error("Capture device error: {0}")]
    Device(String),
}

#[derive(Error, Debug)]
pub enum CallError {
    #[error("Already in call {0}")]
    AlreadyInCall(String),

    #[error("Not in a call")]
    NotInCall,

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),
}
