//! Password hashing and signed access tokens
//!
//! Passwords are stored as Argon2 PHC strings. `POST /token` hands out an
//! HS256 JWT whose `sub` is the username and whose `exp` is
//! `auth.token_minutes` from issue.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{Config, SECRET_KEY};
use crate::error::{ButterflyError, Result};

/// Hashes `password` with a fresh random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ButterflyError::Auth(format!("could not hash password: {}", e)))
}

/// Checks `password` against a stored hash. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// Response body of `POST /token`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Signed JWT
    pub access_token: String,
    /// Always `bearer`
    pub token_type: String,
}

/// Signs and checks access tokens with one HMAC secret
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl TokenIssuer {
    /// Issuer signing with `secret`, tokens valid for `lifetime`
    pub fn new(secret: &str, lifetime: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime,
        }
    }

    /// Issuer over `SECRET_KEY`.
    ///
    /// Without one a random secret is used, so tokens stop verifying when
    /// the process restarts.
    pub fn from_config(config: &Config) -> Self {
        let lifetime = Duration::minutes(config.auth.token_minutes);
        match config.api_keys.secret_key.as_deref() {
            Some(secret) => Self::new(secret, lifetime),
            None => {
                warn!("{} is not set, access tokens will not survive a restart", SECRET_KEY);
                let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
                Self::new(&secret, lifetime)
            }
        }
    }

    /// Lifetime of issued tokens
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Token for `username` valid from now
    pub fn issue(&self, username: &str) -> Result<AccessToken> {
        self.issue_at(username, Utc::now())
    }

    /// Token for `username` as if issued at `now`
    pub fn issue_at(&self, username: &str, now: DateTime<Utc>) -> Result<AccessToken> {
        let claims = Claims {
            sub: username.to_string(),
            exp: (now + self.lifetime).timestamp(),
        };
        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ButterflyError::Auth(format!("could not sign token: {}", e)))?;
        Ok(AccessToken {
            access_token,
            token_type: "bearer".into(),
        })
    }

    /// Username carried by a valid, unexpired token
    pub fn verify(&self, token: &str) -> Result<String> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims.sub)
            .map_err(|e| ButterflyError::Auth(e.to_string()))
    }
}
