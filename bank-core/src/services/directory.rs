//! Directory service - users and their accounts

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountType, User};
use crate::ports::LedgerStore;

pub struct DirectoryService {
    store: Arc<dyn LedgerStore>,
    require_unique_email: bool,
    /// Held across the uniqueness checks and the insert. The schema only
    /// enforces unique usernames; email uniqueness is a setting.
    registration: Mutex<()>,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn LedgerStore>, require_unique_email: bool) -> Self {
        Self {
            store,
            require_unique_email,
            registration: Mutex::new(()),
        }
    }

    /// Insert a new user. Usernames are always unique; emails only when
    /// `require_unique_email` is set.
    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> Result<User> {
        let _registration = self
            .registration
            .lock()
            .map_err(|e| Error::Other(format!("registration lock poisoned: {}", e)))?;

        if self.store.get_user_by_username(username)?.is_some() {
            return Err(Error::conflict(format!(
                "username '{}' is already taken",
                username
            )));
        }
        if self.require_unique_email && self.store.get_user_by_email(email)?.is_some() {
            return Err(Error::conflict("email is already registered"));
        }

        let user = User::new(username, email, password_hash);
        self.store.insert_user(&user)?;
        tracing::info!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub fn get_user(&self, user_id: Uuid) -> Result<User> {
        self.store
            .get_user_by_id(user_id)?
            .ok_or_else(|| Error::not_found(format!("user {}", user_id)))
    }

    /// Open an account with a zero balance
    pub fn create_account(&self, user_id: Uuid, account_type: AccountType) -> Result<Account> {
        self.get_user(user_id)?;

        let account = Account::new(user_id, account_type);
        self.store.insert_account(&account)?;
        tracing::info!(account_id = %account.id, %account_type, "account created");
        Ok(account)
    }

    pub fn list_accounts(&self, user_id: Uuid) -> Result<Vec<Account>> {
        self.store.get_user_accounts(user_id)
    }

    pub fn get_account(&self, account_id: Uuid) -> Result<Account> {
        self.store
            .get_account(account_id)?
            .ok_or_else(|| Error::not_found(format!("account {}", account_id)))
    }

    /// The account, provided `user_id` owns it.
    ///
    /// A missing account is `NotFound`; someone else's is `Forbidden`.
    pub fn owned_account(&self, user_id: Uuid, account_id: Uuid) -> Result<Account> {
        let account = self.get_account(account_id)?;
        if !account.is_owned_by(user_id) {
            return Err(Error::Forbidden(format!(
                "account {} belongs to another user",
                account_id
            )));
        }
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbRepository;
    use std::sync::Barrier;
    use std::thread;

    fn service(require_unique_email: bool) -> DirectoryService {
        let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        DirectoryService::new(repo, require_unique_email)
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        let directory = service(true);
        directory.create_user("dave", "dave@example.com", "h").unwrap();
        let err = directory
            .create_user("dave", "other@example.com", "h")
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_email_uniqueness_is_configurable() {
        let strict = service(true);
        strict.create_user("erin", "shared@example.com", "h").unwrap();
        assert!(matches!(
            strict.create_user("frank", "SHARED@example.com", "h"),
            Err(Error::Conflict(_))
        ));

        let relaxed = service(false);
        relaxed.create_user("erin", "shared@example.com", "h").unwrap();
        relaxed.create_user("frank", "shared@example.com", "h").unwrap();
    }

    #[test]
    fn test_create_account_starts_at_zero() {
        let directory = service(true);
        let user = directory.create_user("gina", "gina@example.com", "h").unwrap();

        let savings = directory.create_account(user.id, AccountType::Savings).unwrap();
        let checking = directory.create_account(user.id, AccountType::Checking).unwrap();
        assert_ne!(savings.id, checking.id);
        assert_eq!(savings.balance.to_string(), "0.00");

        let accounts = directory.list_accounts(user.id).unwrap();
        assert_eq!(accounts.len(), 2);
    }

    #[test]
    fn test_create_account_for_unknown_user() {
        let directory = service(true);
        assert!(matches!(
            directory.create_account(Uuid::new_v4(), AccountType::Savings),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_owned_account_distinguishes_missing_from_foreign() {
        let directory = service(true);
        let owner = directory.create_user("hank", "hank@example.com", "h").unwrap();
        let other = directory.create_user("ivy", "ivy@example.com", "h").unwrap();
        let account = directory.create_account(owner.id, AccountType::Checking).unwrap();

        assert!(directory.owned_account(owner.id, account.id).is_ok());
        assert!(matches!(
            directory.owned_account(other.id, account.id),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            directory.owned_account(owner.id, Uuid::new_v4()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_registrations_with_same_email() {
        const THREADS: usize = 8;
        let directory = Arc::new(service(true));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let directory = Arc::clone(&directory);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    directory.create_user(&format!("racer{}", i), "race@example.com", "h")
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(created, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::Conflict(msg) if msg == "email is already registered")));
    }
}
