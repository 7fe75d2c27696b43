//! Transaction service - the `post-transaction` flow
//!
//! Validates a request, checks ownership, serializes access to the touched
//! accounts, runs the processor and commits the ledger entry atomically.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Locale, Transaction, TransactionRequest};
use crate::ports::LedgerStore;
use crate::services::{DirectoryService, TransactionProcessor};

/// Commits retried after a stale-balance conflict
const MAX_COMMIT_RETRIES: u32 = 3;

/// Initial retry delay in milliseconds (doubles each retry)
const INITIAL_RETRY_DELAY_MS: u64 = 10;

/// What the client gets back from a successful mutation
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub transaction: Transaction,
    pub message: String,
    /// Source account balance after the mutation
    pub new_balance: Decimal,
}

pub struct TransactionService {
    store: Arc<dyn LedgerStore>,
    directory: Arc<DirectoryService>,
    processor: TransactionProcessor,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    locale: Locale,
}

impl TransactionService {
    pub fn new(store: Arc<dyn LedgerStore>, directory: Arc<DirectoryService>, locale: Locale) -> Self {
        Self {
            processor: TransactionProcessor::new(Arc::clone(&store)),
            store,
            directory,
            locks: Mutex::new(HashMap::new()),
            locale,
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Apply a request to an account owned by `user_id`
    pub fn post(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        request: TransactionRequest,
    ) -> Result<Receipt> {
        let request = request.validated()?;
        self.directory.owned_account(user_id, account_id)?;

        // Accounts are never deleted, so a destination seen here stays valid
        // under the lock. Unknown ids get no lock entry; the processor
        // rejects them.
        let mut ids = vec![account_id];
        if let Some(destination) = request.destination_id() {
            if destination != account_id && self.store.get_account(destination)?.is_some() {
                ids.push(destination);
            }
        }
        let handles = self.lock_handles(&ids)?;
        let _guards = handles
            .iter()
            .map(|handle| {
                handle
                    .lock()
                    .map_err(|e| Error::Other(format!("account lock poisoned: {}", e)))
            })
            .collect::<Result<Vec<MutexGuard<'_, ()>>>>()?;

        let mut attempt = 0;
        loop {
            match self.apply_and_commit(account_id, &request) {
                Err(Error::Conflict(msg)) if attempt < MAX_COMMIT_RETRIES => {
                    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = MAX_COMMIT_RETRIES,
                        "commit conflict, retrying: {}",
                        msg
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Re-read the source under lock, apply, commit
    fn apply_and_commit(&self, account_id: Uuid, request: &TransactionRequest) -> Result<Receipt> {
        let mut account = self.directory.get_account(account_id)?;
        let applied = self.processor.apply(&mut account, request)?;
        let message = applied.message(self.locale).to_string();

        let transaction = self.store.commit(&applied.into_entry())?;
        Ok(Receipt {
            transaction,
            message,
            new_balance: account.balance,
        })
    }

    /// Every transaction touching an account owned by `user_id`, oldest first
    pub fn history(&self, user_id: Uuid, account_id: Uuid) -> Result<Vec<Transaction>> {
        self.directory.owned_account(user_id, account_id)?;
        self.store.get_account_transactions(account_id)
    }

    /// Lock handles for `ids`, sorted ascending so concurrent callers
    /// always acquire in the same order
    fn lock_handles(&self, ids: &[Uuid]) -> Result<Vec<Arc<Mutex<()>>>> {
        let mut sorted = ids.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut locks = self
            .locks
            .lock()
            .map_err(|e| Error::Other(format!("lock table poisoned: {}", e)))?;
        Ok(sorted
            .into_iter()
            .map(|id| Arc::clone(locks.entry(id).or_default()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::{DateTime, Utc};

    use crate::adapters::duckdb::DuckDbRepository;
    use crate::domain::{
        Account, AccountType, LedgerEntry, Rejection, Session, TransactionKind, User,
    };

    /// Store whose first `conflicts` commits fail as if another writer got
    /// there first
    struct ContendedStore {
        inner: DuckDbRepository,
        conflicts: AtomicU32,
        commit_calls: AtomicU32,
    }

    impl ContendedStore {
        fn new(conflicts: u32) -> Arc<Self> {
            Arc::new(Self {
                inner: DuckDbRepository::open_in_memory().unwrap(),
                conflicts: AtomicU32::new(conflicts),
                commit_calls: AtomicU32::new(0),
            })
        }
    }

    impl LedgerStore for ContendedStore {
        fn insert_user(&self, user: &User) -> Result<()> {
            self.inner.insert_user(user)
        }
        fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
            self.inner.get_user_by_id(id)
        }
        fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
            self.inner.get_user_by_username(username)
        }
        fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
            self.inner.get_user_by_email(email)
        }
        fn insert_account(&self, account: &Account) -> Result<()> {
            self.inner.insert_account(account)
        }
        fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
            self.inner.get_account(id)
        }
        fn get_user_accounts(&self, user_id: Uuid) -> Result<Vec<Account>> {
            self.inner.get_user_accounts(user_id)
        }
        fn save_account(&self, account: &Account) -> Result<()> {
            self.inner.save_account(account)
        }
        fn create_transaction(&self, tx: &Transaction) -> Result<Transaction> {
            self.inner.create_transaction(tx)
        }
        fn get_account_transactions(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
            self.inner.get_account_transactions(account_id)
        }
        fn commit(&self, entry: &LedgerEntry) -> Result<Transaction> {
            self.commit_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::conflict("balance changed since it was read"));
            }
            self.inner.commit(entry)
        }
        fn insert_session(&self, session: &Session) -> Result<()> {
            self.inner.insert_session(session)
        }
        fn get_session(&self, token_hash: &str) -> Result<Option<Session>> {
            self.inner.get_session(token_hash)
        }
        fn delete_session(&self, token_hash: &str) -> Result<bool> {
            self.inner.delete_session(token_hash)
        }
        fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
            self.inner.delete_expired_sessions(now)
        }
    }

    struct Fixture {
        service: TransactionService,
        directory: Arc<DirectoryService>,
        owner: Uuid,
    }

    fn fixture(locale: Locale) -> Fixture {
        let store: Arc<dyn LedgerStore> = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        fixture_with_store(store, locale)
    }

    fn fixture_with_store(store: Arc<dyn LedgerStore>, locale: Locale) -> Fixture {
        let directory = Arc::new(DirectoryService::new(Arc::clone(&store), true));
        let owner = directory
            .create_user("nina", "nina@example.com", "h")
            .unwrap()
            .id;
        Fixture {
            service: TransactionService::new(store, Arc::clone(&directory), locale),
            directory,
            owner,
        }
    }

    fn dec(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    #[test]
    fn test_post_deposit_returns_receipt() {
        let f = fixture(Locale::En);
        let account = f.directory.create_account(f.owner, AccountType::Checking).unwrap();

        let receipt = f
            .service
            .post(f.owner, account.id, TransactionRequest::deposit(dec(1050), "  paycheck "))
            .unwrap();

        assert_eq!(receipt.new_balance, dec(1050));
        assert_eq!(receipt.message, "Deposit completed successfully");
        assert_eq!(receipt.transaction.description, "paycheck");
        assert!(receipt.transaction.sequence > 0);
        assert_eq!(f.directory.get_account(account.id).unwrap().balance, dec(1050));
    }

    #[test]
    fn test_rejection_writes_nothing() {
        let f = fixture(Locale::PtBr);
        let account = f.directory.create_account(f.owner, AccountType::Checking).unwrap();

        let err = f
            .service
            .post(f.owner, account.id, TransactionRequest::withdrawal(dec(100), "atm"))
            .unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::InsufficientFunds));
        assert!(f.service.history(f.owner, account.id).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_request_fails_before_lookup() {
        let f = fixture(Locale::En);
        let err = f
            .service
            .post(f.owner, Uuid::new_v4(), TransactionRequest::deposit(dec(-5), "x"))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_foreign_account_is_forbidden() {
        let f = fixture(Locale::En);
        let stranger = f
            .directory
            .create_user("oscar", "oscar@example.com", "h")
            .unwrap();
        let account = f.directory.create_account(f.owner, AccountType::Savings).unwrap();

        let post = f
            .service
            .post(stranger.id, account.id, TransactionRequest::deposit(dec(100), "x"));
        assert!(matches!(post, Err(Error::Forbidden(_))));
        assert!(matches!(
            f.service.history(stranger.id, account.id),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            f.service.history(f.owner, Uuid::new_v4()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_transfer_to_another_users_account() {
        let f = fixture(Locale::En);
        let other = f
            .directory
            .create_user("paul", "paul@example.com", "h")
            .unwrap();
        let source = f.directory.create_account(f.owner, AccountType::Checking).unwrap();
        let destination = f.directory.create_account(other.id, AccountType::Savings).unwrap();

        f.service
            .post(f.owner, source.id, TransactionRequest::deposit(dec(5000), "seed"))
            .unwrap();
        let receipt = f
            .service
            .post(
                f.owner,
                source.id,
                TransactionRequest::transfer(dec(2000), "gift", destination.id.to_string()),
            )
            .unwrap();

        assert_eq!(receipt.new_balance, dec(3000));
        assert_eq!(receipt.transaction.kind, TransactionKind::Transfer);
        assert_eq!(
            f.directory.get_account(destination.id).unwrap().balance,
            dec(2000)
        );
        assert_eq!(f.service.history(other.id, destination.id).unwrap().len(), 1);
    }

    #[test]
    fn test_lock_handles_are_sorted_and_shared() {
        let f = fixture(Locale::En);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let first = f.service.lock_handles(&[a, b]).unwrap();
        let second = f.service.lock_handles(&[b, a, b]).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        for (x, y) in first.iter().zip(second.iter()) {
            assert!(Arc::ptr_eq(x, y));
        }
    }

    #[test]
    fn test_conflict_is_retried_until_commit_succeeds() {
        let store = ContendedStore::new(1);
        let f = fixture_with_store(store.clone(), Locale::En);
        let account = f.directory.create_account(f.owner, AccountType::Checking).unwrap();

        let receipt = f
            .service
            .post(f.owner, account.id, TransactionRequest::deposit(dec(700), "retry"))
            .unwrap();

        assert_eq!(store.commit_calls.load(Ordering::SeqCst), 2);
        assert_eq!(receipt.new_balance, dec(700));
        assert_eq!(f.directory.get_account(account.id).unwrap().balance, dec(700));
        assert_eq!(f.service.history(f.owner, account.id).unwrap().len(), 1);
    }

    #[test]
    fn test_conflict_surfaces_after_retries_run_out() {
        let store = ContendedStore::new(u32::MAX);
        let f = fixture_with_store(store.clone(), Locale::En);
        let account = f.directory.create_account(f.owner, AccountType::Checking).unwrap();

        let err = f
            .service
            .post(f.owner, account.id, TransactionRequest::deposit(dec(700), "busy"))
            .unwrap_err();

        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(
            store.commit_calls.load(Ordering::SeqCst),
            MAX_COMMIT_RETRIES + 1
        );
        assert_eq!(f.directory.get_account(account.id).unwrap().balance, Decimal::ZERO);
        assert!(f.service.history(f.owner, account.id).unwrap().is_empty());
    }

    #[test]
    fn test_transfers_to_missing_accounts_do_not_grow_lock_table() {
        let f = fixture(Locale::En);
        let source = f.directory.create_account(f.owner, AccountType::Checking).unwrap();
        let destination = f.directory.create_account(f.owner, AccountType::Savings).unwrap();
        f.service
            .post(f.owner, source.id, TransactionRequest::deposit(dec(10000), "seed"))
            .unwrap();

        for _ in 0..200 {
            let err = f
                .service
                .post(
                    f.owner,
                    source.id,
                    TransactionRequest::transfer(dec(100), "void", Uuid::new_v4().to_string()),
                )
                .unwrap_err();
            assert_eq!(err.rejection(), Some(&Rejection::RecipientNotFound));
        }
        assert_eq!(f.service.locks.lock().unwrap().len(), 1);

        f.service
            .post(
                f.owner,
                source.id,
                TransactionRequest::transfer(dec(100), "real", destination.id.to_string()),
            )
            .unwrap();
        assert_eq!(f.service.locks.lock().unwrap().len(), 2);
    }
}
