//! [`CallDirectory`] backed by the local SQLite store.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use meshcall_shared::{
    CallDirectory, CallId, CallSession, ChatId, DirectoryError, Participant, ParticipantId,
};

use crate::database::Database;
use crate::error::StoreError;

/// Shared handle to a [`Database`] usable from async code.
#[derive(Clone)]
pub struct SqliteDirectory {
    db: Arc<Mutex<Database>>,
}

impl SqliteDirectory {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// The underlying database, for operations outside the directory trait.
    pub fn database(&self) -> &Arc<Mutex<Database>> {
        &self.db
    }
}

impl From<StoreError> for DirectoryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => DirectoryError::CallNotFound("no such call".into()),
            other => DirectoryError::Unavailable(other.to_string()),
        }
    }
}

#[async_trait]
impl CallDirectory for SqliteDirectory {
    async fn participants(&self, call_id: &CallId) -> Result<Vec<Participant>, DirectoryError> {
        Ok(self.db.lock().await.list_participants(call_id)?)
    }

    async fn create_call(
        &self,
        chat_id: &ChatId,
        creator: &ParticipantId,
    ) -> Result<CallSession, DirectoryError> {
        Ok(self.db.lock().await.create_call(chat_id, creator)?)
    }

    async fn join(&self, call_id: &CallId, user: &ParticipantId) -> Result<(), DirectoryError> {
        self.db
            .lock()
            .await
            .join_call(call_id, user)
            .map_err(|e| match e {
                StoreError::NotFound => DirectoryError::CallNotFound(call_id.to_string()),
                other => other.into(),
            })
    }

    async fn leave(&self, call_id: &CallId, user: &ParticipantId) -> Result<(), DirectoryError> {
        self.db.lock().await.leave_call(call_id, user)?;
        Ok(())
    }

    async fn calls_for(&self, user: &ParticipantId) -> Result<Vec<CallSession>, DirectoryError> {
        Ok(self.db.lock().await.list_calls_for_user(user)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> SqliteDirectory {
        SqliteDirectory::new(Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_roster_through_trait() {
        let dir = directory();
        let call = dir.create_call(&"chat-1".into(), &"alice".into()).await.unwrap();
        dir.join(&call.id, &"bob".into()).await.unwrap();

        let ids: Vec<String> = dir
            .participants(&call.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.user_id.to_string())
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"alice".to_string()));
        assert!(ids.contains(&"bob".to_string()));

        dir.leave(&call.id, &"alice".into()).await.unwrap();
        dir.leave(&call.id, &"bob".into()).await.unwrap();
        assert!(dir.participants(&call.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_join_missing_call_is_not_found() {
        let dir = directory();
        let err = dir.join(&"gone".into(), &"bob".into()).await.unwrap_err();
        assert!(matches!(err, DirectoryError::CallNotFound(ref id) if id == "gone"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_calls_for_member() {
        let dir = directory();
        dir.database()
            .lock()
            .await
            .add_chat_member(&"chat-1".into(), &"bob".into())
            .unwrap();
        dir.create_call(&"chat-1".into(), &"alice".into()).await.unwrap();

        assert_eq!(dir.calls_for(&"bob".into()).await.unwrap().len(), 1);
    }
}
