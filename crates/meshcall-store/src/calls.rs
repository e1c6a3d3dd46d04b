//! CRUD operations for group calls.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use meshcall_shared::{CallId, CallSession, ChatId, ParticipantId};

use crate::database::{not_found, parse_timestamp, Database};
use crate::error::{Result, StoreError};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a call for `chat_id` with `creator` as its first participant.
    pub fn create_call(&self, chat_id: &ChatId, creator: &ParticipantId) -> Result<CallSession> {
        let call = CallSession {
            id: CallId::generate(),
            chat_id: chat_id.clone(),
            created_by: creator.clone(),
            created_at: Utc::now(),
        };

        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "INSERT INTO group_calls (id, chat_id, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                call.id.as_str(),
                call.chat_id.as_str(),
                call.created_by.as_str(),
                call.created_at.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "INSERT INTO call_participants (call_id, user_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![call.id.as_str(), creator.as_str(), call.created_at.to_rfc3339()],
        )?;
        tx.commit()?;

        tracing::debug!(call = %call.id, chat = %call.chat_id, "call created");
        Ok(call)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_call(&self, id: &CallId) -> Result<CallSession> {
        self.conn()
            .query_row(
                "SELECT id, chat_id, created_by, created_at
                 FROM group_calls
                 WHERE id = ?1",
                params![id.as_str()],
                row_to_call,
            )
            .map_err(not_found)
    }

    /// Calls of every chat `user` is a member of, newest first.
    pub fn list_calls_for_user(&self, user: &ParticipantId) -> Result<Vec<CallSession>> {
        let mut stmt = self.conn().prepare(
            "SELECT g.id, g.chat_id, g.created_by, g.created_at
             FROM group_calls g
             JOIN chat_participants c ON c.chat_id = g.chat_id
             WHERE c.user_id = ?1
             ORDER BY g.created_at DESC, g.id ASC",
        )?;

        let rows = stmt.query_map(params![user.as_str()], row_to_call)?;

        let mut calls = Vec::new();
        for row in rows {
            calls.push(row?);
        }
        Ok(calls)
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Add `user` to the call. Joining twice keeps the original row.
    pub fn join_call(&self, call_id: &CallId, user: &ParticipantId) -> Result<()> {
        if !self.call_exists(call_id)? {
            return Err(StoreError::NotFound);
        }
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO call_participants (call_id, user_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![call_id.as_str(), user.as_str(), Utc::now().to_rfc3339()],
        )?;
        if inserted > 0 {
            tracing::debug!(call = %call_id, user = %user.short(), "participant joined");
        }
        Ok(())
    }

    /// Remove `user` from the call. When nobody is left the call row is
    /// deleted as well; the return value says whether that happened.
    pub fn leave_call(&self, call_id: &CallId, user: &ParticipantId) -> Result<bool> {
        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "DELETE FROM call_participants WHERE call_id = ?1 AND user_id = ?2",
            params![call_id.as_str(), user.as_str()],
        )?;

        let remaining: i64 = tx.query_row(
            "SELECT COUNT(*) FROM call_participants WHERE call_id = ?1",
            params![call_id.as_str()],
            |row| row.get(0),
        )?;

        let ended = remaining == 0
            && tx.execute("DELETE FROM group_calls WHERE id = ?1", params![call_id.as_str()])? > 0;
        tx.commit()?;

        if ended {
            tracing::info!(call = %call_id, "last participant left, call ended");
        }
        Ok(ended)
    }

    fn call_exists(&self, id: &CallId) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM group_calls WHERE id = ?1",
                params![id.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_call(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallSession> {
    let id: String = row.get(0)?;
    let chat_id: String = row.get(1)?;
    let created_by: String = row.get(2)?;
    let created_str: String = row.get(3)?;

    Ok(CallSession {
        id: CallId(id),
        chat_id: ChatId(chat_id),
        created_by: ParticipantId(created_by),
        created_at: parse_timestamp(3, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_call_adds_creator() {
        let db = db();
        let call = db.create_call(&"chat-1".into(), &"alice".into()).unwrap();

        let stored = db.get_call(&call.id).unwrap();
        assert_eq!(stored.chat_id, ChatId::from("chat-1"));
        assert_eq!(stored.created_by, ParticipantId::from("alice"));

        let members = db.list_participants(&call.id).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id.as_str(), "alice");
    }

    #[test]
    fn test_join_twice_is_noop() {
        let db = db();
        let call = db.create_call(&"chat-1".into(), &"alice".into()).unwrap();

        db.join_call(&call.id, &"bob".into()).unwrap();
        db.join_call(&call.id, &"bob".into()).unwrap();

        assert_eq!(db.list_participants(&call.id).unwrap().len(), 2);
    }

    #[test]
    fn test_join_unknown_call() {
        let db = db();
        let err = db.join_call(&"missing".into(), &"bob".into()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn test_last_leave_ends_call() {
        let db = db();
        let call = db.create_call(&"chat-1".into(), &"alice".into()).unwrap();
        db.join_call(&call.id, &"bob".into()).unwrap();

        assert!(!db.leave_call(&call.id, &"alice".into()).unwrap());
        assert!(db.get_call(&call.id).is_ok());

        assert!(db.leave_call(&call.id, &"bob".into()).unwrap());
        assert!(matches!(db.get_call(&call.id), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_leave_unknown_call() {
        let db = db();
        assert!(!db.leave_call(&"missing".into(), &"bob".into()).unwrap());
    }

    #[test]
    fn test_calls_follow_chat_membership() {
        let db = db();
        db.add_chat_member(&"chat-1".into(), &"bob".into()).unwrap();
        db.add_chat_member(&"chat-2".into(), &"carol".into()).unwrap();

        let first = db.create_call(&"chat-1".into(), &"alice".into()).unwrap();
        db.create_call(&"chat-2".into(), &"alice".into()).unwrap();

        let calls = db.list_calls_for_user(&"bob".into()).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, first.id);

        assert!(db.list_calls_for_user(&"dave".into()).unwrap().is_empty());
    }
}
