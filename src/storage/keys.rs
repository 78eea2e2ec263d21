//! API key store

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rusqlite::{params, ErrorCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::database::Database;
use crate::error::{ButterflyError, Result};

/// Longest key lifetime the store will issue
pub const MAX_VALIDITY_DAYS: i64 = 36_500;

/// One issued API key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    /// Opaque bearer token
    pub key: String,
    /// Issue time
    pub created_at: DateTime<Utc>,
    /// The key stops validating at this instant
    pub expires_at: DateTime<Utc>,
}

impl ApiKeyRecord {
    /// Fresh random key valid for `validity` from `now`
    pub fn generate(now: DateTime<Utc>, validity: Duration) -> Self {
        Self {
            key: Uuid::new_v4().to_string(),
            created_at: now,
            expires_at: now + validity,
        }
    }

    /// Whether the key is still valid at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Issues, validates and revokes API keys
#[derive(Clone)]
pub struct KeyStore {
    db: Database,
    validity: Duration,
}

impl KeyStore {
    /// Create a store issuing keys valid for `validity_days`, clamped to
    /// `1..=MAX_VALIDITY_DAYS`
    pub fn new(db: Database, validity_days: i64) -> Self {
        Self {
            db,
            validity: Duration::days(validity_days.clamp(1, MAX_VALIDITY_DAYS)),
        }
    }

    /// Lifetime of newly issued keys
    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Generates and stores a new key.
    ///
    /// Returns `None` when the generated key collides with a stored one.
    pub fn issue(&self) -> Result<Option<ApiKeyRecord>> {
        let record = ApiKeyRecord::generate(Utc::now(), self.validity);
        if self.insert(&record)? {
            info!("Issued API key expiring {}", record.expires_at.to_rfc3339());
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    /// Stores `record`. Returns `false` if the key already exists.
    pub fn insert(&self, record: &ApiKeyRecord) -> Result<bool> {
        let conn = self.db.connection()?;
        let result = conn.execute(
            "INSERT INTO api_keys (key, created_at, expires_at) VALUES (?1, ?2, ?3)",
            params![
                record.key,
                record.created_at.to_rfc3339(),
                record.expires_at.to_rfc3339()
            ],
        );

        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                warn!("API key already exists, nothing stored");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Looks up one key
    pub fn get(&self, key: &str) -> Result<Option<ApiKeyRecord>> {
        let conn = self.db.connection()?;
        let result = conn.query_row(
            "SELECT key, created_at, expires_at FROM api_keys WHERE key = ?1",
            params![key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        );

        match result {
            Ok((key, created_at, expires_at)) => Ok(Some(ApiKeyRecord {
                key,
                created_at: parse_timestamp(&created_at)?,
                expires_at: parse_timestamp(&expires_at)?,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// True iff the key exists and has not expired
    pub fn validate(&self, key: &str) -> Result<bool> {
        self.validate_at(key, Utc::now())
    }

    /// Like [`KeyStore::validate`] against an explicit clock
    pub fn validate_at(&self, key: &str, now: DateTime<Utc>) -> Result<bool> {
        Ok(self.get(key)?.is_some_and(|record| record.is_valid_at(now)))
    }

    /// Deletes a key. Returns whether a key was removed.
    pub fn revoke(&self, key: &str) -> Result<bool> {
        let conn = self.db.connection()?;
        let removed = conn.execute("DELETE FROM api_keys WHERE key = ?1", params![key])?;
        if removed > 0 {
            info!("Revoked API key");
        }
        Ok(removed > 0)
    }

    /// Moves a key's expiry. Returns whether the key exists.
    pub fn set_expiry(&self, key: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        let conn = self.db.connection()?;
        let updated = conn.execute(
            "UPDATE api_keys SET expires_at = ?1 WHERE key = ?2",
            params![expires_at.to_rfc3339(), key],
        )?;
        Ok(updated > 0)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ButterflyError::Message(format!("invalid timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> KeyStore {
        KeyStore::new(Database::in_memory().unwrap(), 365)
    }

    #[test]
    fn test_issue_validate_revoke() {
        let store = store();
        let record = store.issue().unwrap().unwrap();

        assert_eq!(record.expires_at - record.created_at, Duration::days(365));
        assert!(Uuid::parse_str(&record.key).is_ok());
        assert!(store.validate(&record.key).unwrap());

        assert!(store.revoke(&record.key).unwrap());
        assert!(!store.validate(&record.key).unwrap());
        assert!(!store.revoke(&record.key).unwrap());
    }

    #[test]
    fn test_expired_key_is_invalid() {
        let store = store();
        let record = store.issue().unwrap().unwrap();

        assert!(store.set_expiry(&record.key, Utc::now() - Duration::seconds(1)).unwrap());
        assert!(!store.validate(&record.key).unwrap());
        assert!(store.get(&record.key).unwrap().is_some());
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let store = store();
        let record = store.issue().unwrap().unwrap();
        let stored = store.get(&record.key).unwrap().unwrap();

        assert!(store.validate_at(&record.key, stored.expires_at - Duration::milliseconds(1)).unwrap());
        assert!(!store.validate_at(&record.key, stored.expires_at).unwrap());
    }

    #[test]
    fn test_duplicate_insert_is_reported() {
        let store = store();
        let record = ApiKeyRecord::generate(Utc::now(), Duration::days(1));

        assert!(store.insert(&record).unwrap());
        assert!(!store.insert(&record).unwrap());
    }

    #[test]
    fn test_validity_is_clamped() {
        let db = Database::in_memory().unwrap();
        assert_eq!(KeyStore::new(db.clone(), i64::MAX).validity(), Duration::days(MAX_VALIDITY_DAYS));
        assert_eq!(KeyStore::new(db, -5).validity(), Duration::days(1));
    }

    #[test]
    fn test_unknown_key() {
        let store = store();
        assert!(store.get("nope").unwrap().is_none());
        assert!(!store.validate("nope").unwrap());
        assert!(!store.set_expiry("nope", Utc::now()).unwrap());
    }
}
