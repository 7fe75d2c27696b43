//! Event log - privacy-safe usage and failure events in logs.duckdb
//!
//! An event records what happened (`transaction_posted`, `command_failed`,
//! ...), which command ran, the transaction kind and a stable error code.
//! Amounts, balances, usernames and descriptions never reach this table.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use duckdb::types::Value;
use duckdb::Connection;
use serde::Serialize;

use crate::domain::result::Error;
use crate::domain::TransactionKind;
use crate::services::MigrationService;

/// An event to record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogEvent {
    pub event: String,
    pub command: Option<String>,
    pub transaction_kind: Option<TransactionKind>,
    pub error_code: Option<&'static str>,
}

impl LogEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Default::default()
        }
    }

    /// A failure event carrying the error's code, never its message
    pub fn failure(event: impl Into<String>, err: &Error) -> Self {
        Self::new(event).with_error_code(err.code())
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_transaction_kind(mut self, kind: TransactionKind) -> Self {
        self.transaction_kind = Some(kind);
        self
    }

    pub fn with_error_code(mut self, code: &'static str) -> Self {
        self.error_code = Some(code);
        self
    }
}

/// A stored event
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub logged_at: DateTime<Utc>,
    pub app_version: String,
    pub platform: String,
    pub event: String,
    pub command: Option<String>,
    pub transaction_kind: Option<String>,
    pub error_code: Option<String>,
}

impl LogEntry {
    pub fn is_failure(&self) -> bool {
        self.error_code.is_some()
    }
}

/// Which entries [`LoggingService::entries`] returns, newest first
#[derive(Debug, Clone)]
pub struct LogFilter {
    pub limit: usize,
    pub failures_only: bool,
    pub event: Option<String>,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            limit: 50,
            failures_only: false,
            event: None,
        }
    }
}

/// Occurrences of one event name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventCount {
    pub event: String,
    pub total: u64,
    pub failed: u64,
}

const ENTRY_COLUMNS: &str =
    "id, logged_at_ms, app_version, platform, event, command, transaction_kind, error_code";

fn row_to_entry(row: &duckdb::Row) -> duckdb::Result<LogEntry> {
    let logged_at_ms: i64 = row.get(1)?;
    Ok(LogEntry {
        id: row.get(0)?,
        logged_at: Utc
            .timestamp_millis_opt(logged_at_ms)
            .single()
            .unwrap_or_default(),
        app_version: row.get(2)?,
        platform: row.get(3)?,
        event: row.get(4)?,
        command: row.get(5)?,
        transaction_kind: row.get(6)?,
        error_code: row.get(7)?,
    })
}

pub struct LoggingService {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    app_version: String,
}

impl LoggingService {
    /// Open or create `logs.duckdb` in the bank directory and migrate it
    pub fn new(bank_dir: &Path, app_version: impl Into<String>) -> Result<Self> {
        let db_path = bank_dir.join("logs.duckdb");
        let conn = Connection::open(&db_path)?;
        MigrationService::for_logs(&conn).run_pending()?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            app_version: app_version.into(),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))
    }

    /// Record an event stamped with the app version and OS
    pub fn log(&self, event: LogEvent) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO sys_logs (
                logged_at_ms, app_version, platform,
                event, command, transaction_kind, error_code
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            duckdb::params![
                Utc::now().timestamp_millis(),
                &self.app_version,
                std::env::consts::OS,
                &event.event,
                &event.command,
                event.transaction_kind.map(|k| k.as_str()),
                event.error_code,
            ],
        )?;
        Ok(())
    }

    pub fn entries(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        let mut conditions = Vec::new();
        let mut params = Vec::new();
        if filter.failures_only {
            conditions.push("error_code IS NOT NULL");
        }
        if let Some(event) = &filter.event {
            conditions.push("event = ?");
            params.push(Value::Text(event.clone()));
        }
        params.push(Value::BigInt(filter.limit as i64));

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM sys_logs {} ORDER BY id DESC LIMIT ?",
            ENTRY_COLUMNS, where_clause
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(duckdb::params_from_iter(params), row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sys_logs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Totals and failures per event name, most frequent first
    pub fn event_counts(&self) -> Result<Vec<EventCount>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT event, COUNT(*), COUNT(error_code) FROM sys_logs \
             GROUP BY event ORDER BY COUNT(*) DESC, event",
        )?;
        let counts = stmt
            .query_map([], |row| {
                let total: i64 = row.get(1)?;
                let failed: i64 = row.get(2)?;
                Ok(EventCount {
                    event: row.get(0)?,
                    total: total as u64,
                    failed: failed as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    /// Delete entries logged before `cutoff`
    pub fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM sys_logs WHERE logged_at_ms < ?",
            [cutoff.timestamp_millis()],
        )?;
        Ok(deleted as u64)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
