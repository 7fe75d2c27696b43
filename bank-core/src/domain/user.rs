//! User domain model

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// argon2 PHC string, never the clear-text password
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]{3,20}$").expect("valid username regex"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"))
}

impl User {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: Self::normalize_email(&email.into()),
            password_hash: password_hash.into(),
            created_at: Utc::now(),
        }
    }

    /// Emails are compared case-insensitively
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Usernames: 3-20 characters of letters, digits, `_`, `.` or `-`
    pub fn validate_username(username: &str) -> Result<(), &'static str> {
        if username_pattern().is_match(username) {
            Ok(())
        } else {
            Err("username must be 3-20 characters of letters, digits, '_', '.' or '-'")
        }
    }

    pub fn validate_email(email: &str) -> Result<(), &'static str> {
        if email_pattern().is_match(email.trim()) {
            Ok(())
        } else {
            Err("email address is not valid")
        }
    }
}
