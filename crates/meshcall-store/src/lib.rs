//! # meshcall-store
//!
//! SQLite persistence for group calls: call rows, call participants, chat
//! membership and user profiles. The crate exposes a synchronous
//! [`Database`] handle with typed CRUD helpers, and [`SqliteDirectory`],
//! which serves the same data through the async `CallDirectory` boundary.

pub mod calls;
pub mod database;
pub mod directory;
pub mod migrations;
pub mod participants;
pub mod profiles;

mod error;

pub use database::Database;
pub use directory::SqliteDirectory;
pub use error::{Result, StoreError};
