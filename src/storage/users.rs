//! User account store

use chrono::Utc;
use log::{info, warn};
use rusqlite::{params, ErrorCode, OptionalExtension};

use super::database::Database;
use crate::auth::{hash_password, verify_password};
use crate::error::Result;

/// Registers users and checks their passwords
#[derive(Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    /// Create a store over `db`
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Stores `username` with a hash of `password`.
    ///
    /// Returns `false` when the username is already taken.
    pub fn register(&self, username: &str, password: &str) -> Result<bool> {
        let hashed = hash_password(password)?;
        let conn = self.db.connection()?;
        let result = conn.execute(
            "INSERT INTO users (username, hashed_password, created_at) VALUES (?1, ?2, ?3)",
            params![username, hashed, Utc::now().to_rfc3339()],
        );

        match result {
            Ok(_) => {
                info!("Registered user {}", username);
                Ok(true)
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                warn!("Username {} is already registered", username);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// True iff the user exists and `password` matches
    pub fn authenticate(&self, username: &str, password: &str) -> Result<bool> {
        Ok(self
            .hashed_password(username)?
            .is_some_and(|hash| verify_password(password, &hash)))
    }

    /// Whether `username` is registered
    pub fn exists(&self, username: &str) -> Result<bool> {
        Ok(self.hashed_password(username)?.is_some())
    }

    fn hashed_password(&self, username: &str) -> Result<Option<String>> {
        let conn = self.db.connection()?;
        Ok(conn
            .query_row(
                "SELECT hashed_password FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> UserStore {
        UserStore::new(Database::in_memory().unwrap())
    }

    #[test]
    fn test_register_then_authenticate() {
        let store = store();
        assert!(store.register("alice", "wonderland").unwrap());
        assert!(store.exists("alice").unwrap());

        assert!(store.authenticate("alice", "wonderland").unwrap());
        assert!(!store.authenticate("alice", "looking-glass").unwrap());
        assert!(!store.authenticate("bob", "wonderland").unwrap());
    }

    #[test]
    fn test_duplicate_username_is_refused() {
        let store = store();
        assert!(store.register("alice", "first").unwrap());
        assert!(!store.register("alice", "second").unwrap());
        assert!(store.authenticate("alice", "first").unwrap());
    }

    #[test]
    fn test_password_is_not_stored_in_clear() {
        let store = store();
        store.register("alice", "wonderland").unwrap();
        let stored = store.hashed_password("alice").unwrap().unwrap();
        assert_ne!(stored, "wonderland");
        assert!(!stored.contains("wonderland"));
    }
}
