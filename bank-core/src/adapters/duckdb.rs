//! DuckDB ledger store implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountType, BalanceChange, LedgerEntry, Session, Transaction, TransactionKind, User,
};
use crate::ports::LedgerStore;
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// Map "no rows" to `None`
fn optional<T>(result: duckdb::Result<T>) -> duckdb::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

fn is_unique_violation(err: &duckdb::Error) -> bool {
    let lower = err.to_string().to_lowercase();
    lower.contains("duplicate key") || lower.contains("unique constraint")
}

const USER_COLUMNS: &str = "user_id, username, email, password_hash, created_at";

const ACCOUNT_COLUMNS: &str =
    "account_id, user_id, account_type, balance::VARCHAR, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "transaction_id, seq, account_id, kind, amount::VARCHAR, \
     description, to_account_id, created_at";

/// DuckDB-backed [`LedgerStore`]
///
/// One connection guarded by a mutex; every multi-row write runs inside a
/// DuckDB transaction on that connection.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) a database file and apply pending migrations.
    ///
    /// Opening retries with exponential backoff on file locking errors, which
    /// show up when two CLI invocations race for the same file.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    let repo = Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    };
                    repo.ensure_schema()?;
                    return Ok(repo);
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            delay_ms = delay.as_millis() as u64,
                            "database busy, retrying: {}",
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(last_error.map(Error::from).unwrap_or_else(|| {
            Error::database(format!(
                "Failed to open database after {} retries",
                MAX_RETRIES
            ))
        }))
    }

    /// Private in-memory database with the schema applied
    pub fn open_in_memory() -> Result<Self> {
        let repo = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: None,
        };
        repo.ensure_schema()?;
        Ok(repo)
    }

    fn try_open_connection(db_path: &Path) -> duckdb::Result<Connection> {
        // Autoloading cached extensions is unnecessary and breaks on some
        // signed macOS builds.
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    /// Run database migrations, returning what was applied
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        Ok(MigrationService::new(&conn).run_pending()?)
    }

    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    /// Path of the database file, `None` when in memory
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    /// Name the constraint a rejected user insert ran into
    fn user_conflict(&self, user: &User) -> Result<Error> {
        if self.get_user_by_id(user.id)?.is_some() {
            return Ok(Error::conflict(format!("user {} already exists", user.id)));
        }
        if self.get_user_by_username(&user.username)?.is_some() {
            return Ok(Error::conflict(format!(
                "username '{}' is already taken",
                user.username
            )));
        }
        Ok(Error::conflict("user conflicts with an existing record"))
    }

    fn query_users(&self, filter: &str, value: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM sys_users WHERE {} = ?", USER_COLUMNS, filter);
        let row = optional(conn.query_row(&sql, [value], UserRow::from_row))?;
        row.map(User::try_from).transpose()
    }
}

impl LedgerStore for DuckDbRepository {
    fn insert_user(&self, user: &User) -> Result<()> {
        let inserted = self.conn()?.execute(
            "INSERT INTO sys_users (user_id, username, email, password_hash, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                user.id.to_string(),
                &user.username,
                &user.email,
                &user.password_hash,
                format_timestamp(user.created_at),
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(self.user_conflict(user)?),
            Err(e) => Err(e.into()),
        }
    }

    fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.query_users("user_id", &id.to_string())
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.query_users("username", username)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.query_users("email", &User::normalize_email(email))
    }

    fn insert_account(&self, account: &Account) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_accounts (account_id, user_id, account_type, balance, created_at, updated_at)
             VALUES (?, ?, ?, CAST(? AS DECIMAL(18,2)), ?, ?)",
            params![
                account.id.to_string(),
                account.user_id.to_string(),
                account.account_type.as_str(),
                account.balance.to_string(),
                format_timestamp(account.created_at),
                format_timestamp(account.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM sys_accounts WHERE account_id = ?",
            ACCOUNT_COLUMNS
        );
        let row = optional(conn.query_row(&sql, [id.to_string()], AccountRow::from_row))?;
        row.map(Account::try_from).transpose()
    }

    fn get_user_accounts(&self, user_id: Uuid) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM sys_accounts WHERE user_id = ? ORDER BY created_at, account_id",
            ACCOUNT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([user_id.to_string()], AccountRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(Account::try_from).collect()
    }

    fn save_account(&self, account: &Account) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sys_accounts SET balance = CAST(? AS DECIMAL(18,2)), updated_at = ?
             WHERE account_id = ?",
            params![
                account.balance.to_string(),
                format_timestamp(account.updated_at),
                account.id.to_string(),
            ],
        )?;
        if updated == 0 {
            return Err(Error::not_found(format!("account {}", account.id)));
        }
        Ok(())
    }

    fn create_transaction(&self, tx: &Transaction) -> Result<Transaction> {
        let conn = self.conn()?;
        insert_transaction_in(&conn, tx)
    }

    fn get_account_transactions(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM sys_transactions
             WHERE account_id = ? OR to_account_id = ?
             ORDER BY seq",
            TRANSACTION_COLUMNS
        );
        let id = account_id.to_string();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([&id, &id], TransactionRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    fn commit(&self, entry: &LedgerEntry) -> Result<Transaction> {
        let mut conn = self.conn()?;
        // Dropping `db_tx` without commit rolls every statement back.
        let db_tx = conn.transaction()?;
        let now = Utc::now();

        for change in &entry.changes {
            apply_change_in(&db_tx, change, now)?;
        }
        let recorded = insert_transaction_in(&db_tx, &entry.transaction)?;

        db_tx.commit()?;
        tracing::debug!(
            kind = %recorded.kind,
            sequence = recorded.sequence,
            accounts = entry.changes.len(),
            "ledger entry committed"
        );
        Ok(recorded)
    }

    fn insert_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_sessions (token_hash, user_id, created_at, expires_at)
             VALUES (?, ?, ?, ?)",
            params![
                &session.token_hash,
                session.user_id.to_string(),
                format_timestamp(session.created_at),
                format_timestamp(session.expires_at),
            ],
        )?;
        Ok(())
    }

    fn get_session(&self, token_hash: &str) -> Result<Option<Session>> {
        let conn = self.conn()?;
        let row = optional(conn.query_row(
            "SELECT token_hash, user_id, created_at, expires_at
             FROM sys_sessions WHERE token_hash = ?",
            [token_hash],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        ))?;

        row.map(|(token_hash, user_id, created_at, expires_at)| {
            Ok(Session {
                token_hash,
                user_id: parse_uuid(&user_id)?,
                created_at: parse_timestamp(&created_at)?,
                expires_at: parse_timestamp(&expires_at)?,
            })
        })
        .transpose()
    }

    fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM sys_sessions WHERE token_hash = ?", [token_hash])?;
        Ok(deleted > 0)
    }

    fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM sys_sessions WHERE expires_at <= ?",
            [format_timestamp(now)],
        )?;
        Ok(deleted)
    }
}

/// Compare-and-set one balance. Zero rows updated means the stored balance
/// moved since it was read.
fn apply_change_in(conn: &Connection, change: &BalanceChange, now: DateTime<Utc>) -> Result<()> {
    let updated = conn.execute(
        "UPDATE sys_accounts SET balance = CAST(? AS DECIMAL(18,2)), updated_at = ?
         WHERE account_id = ? AND balance = CAST(? AS DECIMAL(18,2))",
        params![
            change.current.to_string(),
            format_timestamp(now),
            change.account_id.to_string(),
            change.previous.to_string(),
        ],
    )?;
    if updated != 1 {
        return Err(Error::conflict(format!(
            "balance of account {} changed concurrently",
            change.account_id
        )));
    }
    Ok(())
}

fn insert_transaction_in(conn: &Connection, tx: &Transaction) -> Result<Transaction> {
    let sequence: i64 = conn.query_row("SELECT nextval('seq_transactions')", [], |row| row.get(0))?;
    conn.execute(
        "INSERT INTO sys_transactions
            (transaction_id, seq, account_id, kind, amount, description, to_account_id, created_at)
         VALUES (?, ?, ?, ?, CAST(? AS DECIMAL(18,2)), ?, ?, ?)",
        params![
            tx.id.to_string(),
            sequence,
            tx.account_id.to_string(),
            tx.kind.as_str(),
            tx.amount.to_string(),
            &tx.description,
            tx.to_account_id.map(|id| id.to_string()),
            format_timestamp(tx.created_at),
        ],
    )?;

    let mut recorded = tx.clone();
    recorded.sequence = sequence;
    Ok(recorded)
}

// Raw rows. Columns are read as strings and converted outside the DuckDB
// callback so parse failures surface as our own errors.

struct UserRow {
    user_id: String,
    username: String,
    email: String,
    password_hash: String,
    created_at: String,
}

impl UserRow {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl TryFrom<UserRow> for User {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: parse_uuid(&row.user_id)?,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

struct AccountRow {
    account_id: String,
    user_id: String,
    account_type: String,
    balance: String,
    created_at: String,
    updated_at: String,
}

impl AccountRow {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            account_id: row.get(0)?,
            user_id: row.get(1)?,
            account_type: row.get(2)?,
            balance: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl TryFrom<AccountRow> for Account {
    type Error = Error;

    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(Account {
            id: parse_uuid(&row.account_id)?,
            user_id: parse_uuid(&row.user_id)?,
            account_type: AccountType::from_str(&row.account_type).map_err(Error::Database)?,
            balance: parse_decimal(&row.balance)?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

struct TransactionRow {
    transaction_id: String,
    seq: i64,
    account_id: String,
    kind: String,
    amount: String,
    description: String,
    to_account_id: Option<String>,
    created_at: String,
}

impl TransactionRow {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            transaction_id: row.get(0)?,
            seq: row.get(1)?,
            account_id: row.get(2)?,
            kind: row.get(3)?,
            amount: row.get(4)?,
            description: row.get(5)?,
            to_account_id: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = Error;

    fn try_from(row: TransactionRow) -> Result<Self> {
        let kind = TransactionKind::from_str(&row.kind)
            .map_err(|_| Error::database(format!("unknown transaction kind '{}'", row.kind)))?;
        Ok(Transaction {
            id: parse_uuid(&row.transaction_id)?,
            sequence: row.seq,
            account_id: parse_uuid(&row.account_id)?,
            kind,
            amount: parse_decimal(&row.amount)?,
            description: row.description,
            to_account_id: row.to_account_id.as_deref().map(parse_uuid).transpose()?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

// Helper functions

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("invalid timestamp '{}': {}", s, e)))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::database(format!("invalid id '{}': {}", s, e)))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s.trim())
        .map_err(|e| Error::database(format!("invalid decimal '{}': {}", s, e)))
}
