//! Boundary to the external call/participant storage.
//!
//! The core never stores call or participant rows itself. It reads membership
//! snapshots through this trait; the SQLite store and the HTTP client of the
//! server API both implement it.

use async_trait::async_trait;

use crate::error::DirectoryError;
use crate::models::{CallSession, Participant};
use crate::types::{CallId, ChatId, ParticipantId};

#[async_trait]
pub trait CallDirectory: Send + Sync {
    /// Current participants of a call, profiles resolved where known.
    async fn participants(&self, call_id: &CallId) -> Result<Vec<Participant>, DirectoryError>;

    /// Create a call for a chat with `creator` as its first participant.
    async fn create_call(
        &self,
        chat_id: &ChatId,
        creator: &ParticipantId,
    ) -> Result<CallSession, DirectoryError>;

    /// Add a participant row. Joining twice is not an error.
    async fn join(&self, call_id: &CallId, user: &ParticipantId) -> Result<(), DirectoryError>;

    /// Remove a participant row.
    async fn leave(&self, call_id: &CallId, user: &ParticipantId) -> Result<(), DirectoryError>;

    /// Calls of every chat the user is a member of.
    async fn calls_for(&self, user: &ParticipantId) -> Result<Vec<CallSession>, DirectoryError>;
}
