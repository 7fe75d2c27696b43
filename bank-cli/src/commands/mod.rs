//! CLI command implementations

pub mod account;
pub mod auth;
pub mod logs;
pub mod status;
pub mod transaction;

use std::path::PathBuf;

use anyhow::{Context, Result};
use bank_core::{BankContext, Error, LogEvent, LoggingService};
use uuid::Uuid;

/// Open the event log in the bank directory
pub fn open_logging_service() -> Result<LoggingService> {
    let bank_dir = get_bank_dir()?;
    std::fs::create_dir_all(&bank_dir)?;
    LoggingService::new(&bank_dir, env!("CARGO_PKG_VERSION"))
}

/// Best-effort event recording: a missing or broken log never fails a command
pub struct EventLog(Option<LoggingService>);

impl EventLog {
    pub fn open() -> Self {
        match open_logging_service() {
            Ok(service) => Self(Some(service)),
            Err(e) => {
                tracing::debug!("event log unavailable: {:#}", e);
                Self(None)
            }
        }
    }

    pub fn record(&self, event: LogEvent) {
        if let Some(service) = &self.0 {
            if let Err(e) = service.log(event) {
                tracing::debug!("event log write failed: {:#}", e);
            }
        }
    }
}

/// Bank data directory: `BANK_DIR` or `~/.bank`
pub fn get_bank_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("BANK_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".bank"))
        .context("Could not find home directory; set BANK_DIR")
}

pub fn get_context() -> Result<BankContext> {
    let bank_dir = get_bank_dir()?;
    BankContext::new(&bank_dir)
        .with_context(|| format!("Failed to open bank data in {}", bank_dir.display()))
}

pub fn parse_id(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim()).with_context(|| format!("Invalid {} id: '{}'", what, value))
}

/// Privacy-safe code for a command failure; errors raised by the CLI
/// itself (bad ids, prompts, missing session) are `cli`
pub fn error_code(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<Error>().map_or("cli", Error::code)
}
