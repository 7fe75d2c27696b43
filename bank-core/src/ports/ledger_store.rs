//! Ledger store port - persistence abstraction

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{Account, LedgerEntry, Session, Transaction, User};

/// Persistent keyed storage for users, accounts, transactions and sessions.
///
/// Services receive the store as `Arc<dyn LedgerStore>`, so tests can build
/// isolated instances.
pub trait LedgerStore: Send + Sync {
    // === Users ===

    /// Insert a user; a taken username is a `Conflict`
    fn insert_user(&self, user: &User) -> Result<()>;

    fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Lookup by normalized (lowercase) email
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    // === Accounts ===

    fn insert_account(&self, account: &Account) -> Result<()>;

    fn get_account(&self, id: Uuid) -> Result<Option<Account>>;

    /// Accounts owned by a user, oldest first
    fn get_user_accounts(&self, user_id: Uuid) -> Result<Vec<Account>>;

    /// Persist a mutated balance
    fn save_account(&self, account: &Account) -> Result<()>;

    // === Transactions ===

    /// Append a transaction record, returning it with its sequence assigned
    fn create_transaction(&self, tx: &Transaction) -> Result<Transaction>;

    /// Transactions where the account is source or destination, in insertion order
    fn get_account_transactions(&self, account_id: Uuid) -> Result<Vec<Transaction>>;

    /// Apply every balance change and append the transaction as one unit.
    ///
    /// Each change is only applied if the stored balance still equals
    /// `previous`; otherwise nothing is written and `Conflict` is returned.
    fn commit(&self, entry: &LedgerEntry) -> Result<Transaction>;

    // === Sessions ===

    fn insert_session(&self, session: &Session) -> Result<()>;

    fn get_session(&self, token_hash: &str) -> Result<Option<Session>>;

    /// Returns true if a session was removed
    fn delete_session(&self, token_hash: &str) -> Result<bool>;

    /// Remove sessions that expired before `now`, returning how many
    fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize>;
}
