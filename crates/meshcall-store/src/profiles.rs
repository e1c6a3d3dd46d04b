//! User profile rows used to label call participants.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{params, params_from_iter, OptionalExtension};

use meshcall_shared::{ParticipantId, Profile};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Insert or replace the profile of `user`.
    pub fn upsert_profile(&self, user: &ParticipantId, profile: &Profile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, username, display_name, avatar_url, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 username = excluded.username,
                 display_name = excluded.display_name,
                 avatar_url = excluded.avatar_url,
                 updated_at = excluded.updated_at",
            params![
                user.as_str(),
                profile.username,
                profile.display_name,
                profile.avatar_url,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_profile(&self, user: &ParticipantId) -> Result<Option<Profile>> {
        let profile = self
            .conn()
            .query_row(
                "SELECT username, display_name, avatar_url FROM users WHERE id = ?1",
                params![user.as_str()],
                row_to_profile,
            )
            .optional()?;
        Ok(profile)
    }

    /// Batch lookup. Users without a profile row are absent from the map.
    pub fn profiles(&self, ids: &[ParticipantId]) -> Result<HashMap<ParticipantId, Profile>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, username, display_name, avatar_url FROM users WHERE id IN ({placeholders})"
        );
        let mut stmt = self.conn().prepare(&sql)?;

        let rows = stmt.query_map(params_from_iter(ids.iter().map(|id| id.as_str())), |row| {
            let id: String = row.get(0)?;
            Ok((
                ParticipantId(id),
                Profile {
                    username: row.get(1)?,
                    display_name: row.get(2)?,
                    avatar_url: row.get(3)?,
                },
            ))
        })?;

        let mut profiles = HashMap::new();
        for row in rows {
            let (id, profile) = row?;
            profiles.insert(id, profile);
        }
        Ok(profiles)
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        username: row.get(0)?,
        display_name: row.get(1)?,
        avatar_url: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Profile {
        Profile {
            username: Some("alice".into()),
            display_name: Some("Alice".into()),
            avatar_url: None,
        }
    }

    #[test]
    fn test_upsert_replaces() {
        let db = Database::open_in_memory().unwrap();
        let id = ParticipantId::from("u-1");

        db.upsert_profile(&id, &alice()).unwrap();
        let mut renamed = alice();
        renamed.display_name = Some("Alice B.".into());
        db.upsert_profile(&id, &renamed).unwrap();

        assert_eq!(db.get_profile(&id).unwrap(), Some(renamed));
        assert_eq!(db.get_profile(&"nobody".into()).unwrap(), None);
    }

    #[test]
    fn test_batch_lookup_skips_unknown() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_profile(&"u-1".into(), &alice()).unwrap();

        let found = db.profiles(&["u-1".into(), "u-2".into()]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found.get(&ParticipantId::from("u-1")), Some(&alice()));

        assert!(db.profiles(&[]).unwrap().is_empty());
    }
}
