//! Authentication service - registration, login and bearer sessions
//!
//! Passwords are hashed with Argon2id into PHC strings. A login issues a
//! random bearer token; only its SHA-256 is stored, so a leaked database
//! does not leak live sessions.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::domain::result::{Error, Result};
use crate::domain::{Argon2Params, Session, SessionToken, User};
use crate::ports::LedgerStore;
use crate::services::DirectoryService;

/// Shortest accepted password, in characters
pub const MIN_PASSWORD_LEN: usize = 6;

const INVALID_CREDENTIALS: &str = "invalid credentials";

pub struct AuthService {
    store: Arc<dyn LedgerStore>,
    directory: Arc<DirectoryService>,
    argon2_params: Argon2Params,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        directory: Arc<DirectoryService>,
        argon2_params: Argon2Params,
        session_ttl: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            argon2_params,
            session_ttl,
        }
    }

    /// Validate and create a user with a hashed password
    pub fn register(&self, username: &str, email: &str, password: &str) -> Result<User> {
        let username = username.trim();
        User::validate_username(username).map_err(Error::validation)?;
        User::validate_email(email).map_err(Error::validation)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let hash = self.hash_password(password)?;
        self.directory.create_user(username, email, &hash)
    }

    /// Check credentials and open a session.
    ///
    /// Unknown usernames and wrong passwords fail with the same message.
    pub fn login(&self, username: &str, password: &str) -> Result<SessionToken> {
        let pruned = self.store.delete_expired_sessions(Utc::now())?;
        if pruned > 0 {
            tracing::debug!(pruned, "expired sessions removed");
        }

        let user = self
            .store
            .get_user_by_username(username.trim())?
            .ok_or_else(|| Error::unauthorized(INVALID_CREDENTIALS))?;
        if !self.verify_password(password, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, "login rejected");
            return Err(Error::unauthorized(INVALID_CREDENTIALS));
        }

        let token = generate_token();
        let session = Session::new(hash_token(&token), user.id, self.session_ttl);
        self.store.insert_session(&session)?;
        tracing::info!(user_id = %user.id, "session opened");

        Ok(SessionToken {
            token,
            user_id: user.id,
            expires_at: session.expires_at,
        })
    }

    /// Resolve a bearer token to its user. Expired sessions are removed.
    pub fn authenticate(&self, token: &str) -> Result<User> {
        let token_hash = hash_token(token.trim());
        let session = self
            .store
            .get_session(&token_hash)?
            .ok_or_else(|| Error::unauthorized("not logged in"))?;

        if session.is_expired_at(Utc::now()) {
            self.store.delete_session(&token_hash)?;
            return Err(Error::unauthorized("session expired"));
        }

        self.store
            .get_user_by_id(session.user_id)?
            .ok_or_else(|| Error::unauthorized("not logged in"))
    }

    /// End a session; returns false if the token was not active
    pub fn logout(&self, token: &str) -> Result<bool> {
        self.store.delete_session(&hash_token(token.trim()))
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.argon2_params.memory_cost,
            self.argon2_params.time_cost,
            self.argon2_params.parallelism,
            None,
        )
        .map_err(|e| Error::Config(format!("invalid argon2 parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt: [u8; 16] = rand::thread_rng().gen();
        let salt = SaltString::encode_b64(&salt)
            .map_err(|e| Error::Other(format!("failed to encode salt: {}", e)))?;
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Other(format!("failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Verify against a stored PHC string. The parameters embedded in the
    /// hash win over the configured ones.
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| Error::database(format!("stored password hash is malformed: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest of a bearer token
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
