//! Configuration management
//!
//! Settings live in `<bank_dir>/settings.json`:
//! ```json
//! {
//!   "app": { "locale": "en", "requireUniqueEmail": true, "sessionTtlMinutes": 60 }
//! }
//! ```
//! Keys this crate does not manage are kept as-is when saving.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};
use crate::domain::{Argon2Params, Locale};

/// Default login session lifetime
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 60;

/// Longest accepted session lifetime (one year)
pub const MAX_SESSION_TTL_MINUTES: i64 = 525_600;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    require_unique_email: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_ttl_minutes: Option<i64>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Bank configuration (resolved view of settings plus env overrides)
#[derive(Debug, Clone)]
pub struct Config {
    pub locale: Locale,
    pub require_unique_email: bool,
    pub session_ttl_minutes: i64,
    pub argon2: Argon2Params,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            require_unique_email: true,
            session_ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            argon2: Argon2Params::default(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn read_settings(settings_path: &Path) -> Result<SettingsFile> {
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(settings_path)?;
    Ok(serde_json::from_str(&content).unwrap_or_else(|e| {
        tracing::warn!(path = %settings_path.display(), "ignoring unreadable settings: {}", e);
        SettingsFile::default()
    }))
}

impl Config {
    /// Load config from the bank directory.
    ///
    /// Environment variables win over the file: `BANK_LOCALE`,
    /// `BANK_REQUIRE_UNIQUE_EMAIL`, `BANK_SESSION_TTL_MINUTES`.
    pub fn load(bank_dir: &Path) -> Result<Self> {
        let raw = read_settings(&bank_dir.join("settings.json"))?;
        let mut config = Self::default();

        if let Some(locale) = raw.app.locale.as_deref() {
            config.locale = locale.parse().map_err(Error::Config)?;
        }
        if let Some(unique) = raw.app.require_unique_email {
            config.require_unique_email = unique;
        }
        if let Some(ttl) = raw.app.session_ttl_minutes {
            config.session_ttl_minutes = ttl;
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(locale) = var("BANK_LOCALE") {
            self.locale = locale.parse().map_err(Error::Config)?;
        }
        if let Some(unique) = var("BANK_REQUIRE_UNIQUE_EMAIL") {
            self.require_unique_email = parse_bool(&unique).ok_or_else(|| {
                Error::Config(format!("BANK_REQUIRE_UNIQUE_EMAIL: invalid value '{}'", unique))
            })?;
        }
        if let Some(ttl) = var("BANK_SESSION_TTL_MINUTES") {
            self.session_ttl_minutes = ttl.trim().parse().map_err(|_| {
                Error::Config(format!("BANK_SESSION_TTL_MINUTES: invalid value '{}'", ttl))
            })?;
        }
        Ok(())
    }

    /// Reject values the services cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.session_ttl_minutes <= 0 || self.session_ttl_minutes > MAX_SESSION_TTL_MINUTES {
            return Err(Error::Config(format!(
                "session TTL must be between 1 and {} minutes, got {}",
                MAX_SESSION_TTL_MINUTES, self.session_ttl_minutes
            )));
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_ttl_minutes)
    }

    /// Save config to the bank directory, preserving unmanaged settings
    pub fn save(&self, bank_dir: &Path) -> Result<()> {
        let settings_path = bank_dir.join("settings.json");
        let mut settings = read_settings(&settings_path)?;

        settings.app.locale = Some(self.locale.as_str().to_string());
        settings.app.require_unique_email = Some(self.require_unique_email);
        settings.app.session_ttl_minutes = Some(self.session_ttl_minutes);

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempdir().unwrap();
        let raw = read_settings(&dir.path().join("settings.json")).unwrap();
        assert!(raw.app.locale.is_none());

        let config = Config::default();
        assert_eq!(config.locale, Locale::En);
        assert!(config.require_unique_email);
        assert_eq!(config.session_ttl_minutes, 60);
    }

    #[test]
    fn test_save_preserves_unknown_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"app": {"theme": "dark"}, "plugins": {"x": 1}}"#,
        )
        .unwrap();

        let config = Config {
            locale: Locale::PtBr,
            require_unique_email: false,
            ..Config::default()
        };
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["app"]["theme"], "dark");
        assert_eq!(saved["plugins"]["x"], 1);
        assert_eq!(saved["app"]["locale"], "pt-br");
        assert_eq!(saved["app"]["requireUniqueEmail"], false);

        let raw = read_settings(&path).unwrap();
        assert_eq!(raw.app.locale.as_deref(), Some("pt-br"));
        assert_eq!(raw.app.session_ttl_minutes, Some(60));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        let env: HashMap<&str, &str> = [
            ("BANK_LOCALE", "pt_BR"),
            ("BANK_REQUIRE_UNIQUE_EMAIL", "no"),
            ("BANK_SESSION_TTL_MINUTES", "15"),
        ]
        .into_iter()
        .collect();

        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.locale, Locale::PtBr);
        assert!(!config.require_unique_email);
        assert_eq!(config.session_ttl(), chrono::Duration::minutes(15));
    }

    #[test]
    fn test_invalid_env_values_are_config_errors() {
        let mut config = Config::default();
        let err = config
            .apply_env(|key| (key == "BANK_REQUIRE_UNIQUE_EMAIL").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        config.session_ttl_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_session_ttl_is_rejected() {
        let mut config = Config::default();
        config
            .apply_env(|key| {
                (key == "BANK_SESSION_TTL_MINUTES").then(|| i64::MAX.to_string())
            })
            .unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.session_ttl_minutes = MAX_SESSION_TTL_MINUTES + 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.session_ttl_minutes = MAX_SESSION_TTL_MINUTES;
        config.validate().unwrap();
        assert_eq!(config.session_ttl(), chrono::Duration::days(365));
    }

    #[test]
    fn test_load_rejects_oversized_ttl_from_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            format!(r#"{{"app": {{"sessionTtlMinutes": {}}}}}"#, i64::MAX),
        )
        .unwrap();
        assert!(matches!(Config::load(dir.path()), Err(Error::Config(_))));
    }
}
