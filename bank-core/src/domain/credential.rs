//! Credential and session domain models

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default Argon2id parameters (argon2 crate recommendations)
pub const DEFAULT_TIME_COST: u32 = 2;
pub const DEFAULT_MEMORY_COST: u32 = 19456; // 19 MiB
pub const DEFAULT_PARALLELISM: u32 = 1;

/// Argon2id parameters for password hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Params {
    pub time_cost: u32,
    pub memory_cost: u32,
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            time_cost: DEFAULT_TIME_COST,
            memory_cost: DEFAULT_MEMORY_COST,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

/// A login session. Only the SHA-256 of the bearer token is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token_hash: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token_hash: impl Into<String>, user_id: Uuid, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            token_hash: token_hash.into(),
            user_id,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// What a client receives after a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expiry() {
        let session = Session::new("abc", Uuid::new_v4(), Duration::minutes(60));
        assert!(!session.is_expired_at(Utc::now()));
        assert!(session.is_expired_at(Utc::now() + Duration::minutes(61)));
    }
}
