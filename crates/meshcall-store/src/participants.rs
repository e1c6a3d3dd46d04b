//! Call participant listings and chat membership.

use chrono::Utc;
use rusqlite::params;

use meshcall_shared::{CallId, ChatId, Participant, ParticipantId, Profile};

use crate::database::{parse_timestamp, Database};
use crate::error::Result;

impl Database {
    /// Participants of a call in join order, with profiles where known.
    ///
    /// An unknown call has no participants.
    pub fn list_participants(&self, call_id: &CallId) -> Result<Vec<Participant>> {
        let mut stmt = self.conn().prepare(
            "SELECT p.user_id, p.joined_at, u.id, u.username, u.display_name, u.avatar_url
             FROM call_participants p
             LEFT JOIN users u ON u.id = p.user_id
             WHERE p.call_id = ?1
             ORDER BY p.joined_at ASC, p.user_id ASC",
        )?;

        let rows = stmt.query_map(params![call_id.as_str()], row_to_participant)?;

        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }
        Ok(participants)
    }

    /// Record that `user` belongs to `chat_id`. Idempotent.
    pub fn add_chat_member(&self, chat_id: &ChatId, user: &ParticipantId) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO chat_participants (chat_id, user_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![chat_id.as_str(), user.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

fn row_to_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    let user_id: String = row.get(0)?;
    let joined_str: String = row.get(1)?;
    let profile_id: Option<String> = row.get(2)?;

    let profile = match profile_id {
        Some(_) => Some(Profile {
            username: row.get(3)?,
            display_name: row.get(4)?,
            avatar_url: row.get(5)?,
        }),
        None => None,
    };

    Ok(Participant {
        user_id: ParticipantId(user_id),
        joined_at: parse_timestamp(1, &joined_str)?,
        profile,
    })
}
