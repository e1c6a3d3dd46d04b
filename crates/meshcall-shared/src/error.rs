use thiserror::Error;

/// Rejections produced while decoding a signaling envelope.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Missing envelope field: {0}")]
    MissingField(&'static str),

    #[error("Unknown envelope type: {0}")]
    UnknownType(String),

    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },

    #[error("Envelope too large: {0} bytes")]
    TooLarge(usize),
}

/// Failures talking to the external call/participant storage.
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// Storage could not be reached; callers retry with backoff.
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Directory rejected request: {0}")]
    Rejected(String),
}

impl DirectoryError {
    /// Whether retrying the same request later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DirectoryError::Unavailable(_))
    }
}
