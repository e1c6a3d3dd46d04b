//! v001 -- Initial schema creation.
//!
//! Creates `users`, `chat_participants`, `group_calls` and
//! `call_participants`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (profile data only; authentication lives elsewhere)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id           TEXT PRIMARY KEY NOT NULL,
    username     TEXT,
    display_name TEXT,
    avatar_url   TEXT,
    updated_at   TEXT NOT NULL                -- RFC-3339
);

-- ----------------------------------------------------------------
-- Chat membership
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_participants (
    chat_id   TEXT NOT NULL,
    user_id   TEXT NOT NULL,
    joined_at TEXT NOT NULL,

    PRIMARY KEY (chat_id, user_id)
);

-- ----------------------------------------------------------------
-- Group calls
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS group_calls (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    chat_id    TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Call participants
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS call_participants (
    call_id   TEXT NOT NULL,                  -- FK -> group_calls(id)
    user_id   TEXT NOT NULL,
    joined_at TEXT NOT NULL,

    PRIMARY KEY (call_id, user_id),
    FOREIGN KEY (call_id) REFERENCES group_calls(id) ON DELETE CASCADE
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
