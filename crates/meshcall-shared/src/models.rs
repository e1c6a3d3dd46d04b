//! Call and participant records as seen by the core.
//!
//! The rows themselves live in external storage; these structs are the
//! snapshot shape handed to the membership registry and to the UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CallId, ChatId, ParticipantId};

/// A group call attached to a chat. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallSession {
    pub id: CallId,
    pub chat_id: ChatId,
    pub created_by: ParticipantId,
    pub created_at: DateTime<Utc>,
}

/// Display metadata resolved through the profile lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// A member of a call. Unique per (call, user).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub user_id: ParticipantId,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub profile: Option<Profile>,
}

impl Participant {
    pub fn new(user_id: impl Into<ParticipantId>) -> Self {
        Self {
            user_id: user_id.into(),
            joined_at: Utc::now(),
            profile: None,
        }
    }

    /// Best label for rendering: display name, then username, then the raw id.
    pub fn label(&self) -> &str {
        self.profile
            .as_ref()
            .and_then(|p| p.display_name.as_deref().or(p.username.as_deref()))
            .unwrap_or(self.user_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_fallbacks() {
        let mut p = Participant::new("u-1");
        assert_eq!(p.label(), "u-1");

        p.profile = Some(Profile {
            username: Some("alice".into()),
            ..Default::default()
        });
        assert_eq!(p.label(), "alice");

        p.profile = Some(Profile {
            username: Some("alice".into()),
            display_name: Some("Alice A.".into()),
            avatar_url: None,
        });
        assert_eq!(p.label(), "Alice A.");
    }
}
