//! Bank Core - users, accounts and an atomic transaction ledger
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (User, Account, Transaction, etc.)
//! - **ports**: Trait definitions for external dependencies (LedgerStore)
//! - **services**: Business logic orchestration
//! - **adapters**: Concrete implementations (DuckDB)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use adapters::duckdb::DuckDbRepository;
use config::Config;
use ports::LedgerStore;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult, Result};
pub use services::{LogEvent, LogFilter, LoggingService};
pub use domain::{
    Account, AccountType, Locale, Rejection, SessionToken, Transaction, TransactionKind,
    TransactionRequest, User,
};

/// Main context for bank operations
///
/// The primary entry point for all business logic. It holds the store,
/// configuration and every service, wired to the same store instance.
pub struct BankContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub directory_service: Arc<DirectoryService>,
    pub auth_service: AuthService,
    pub transaction_service: TransactionService,
    pub status_service: StatusService,
}

impl BankContext {
    /// Open `<bank_dir>/bank.duckdb` with the configuration found in `bank_dir`
    pub fn new(bank_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(bank_dir)?;
        let config = Config::load(bank_dir)?;
        let repository = Arc::new(DuckDbRepository::new(&bank_dir.join("bank.duckdb"))?);
        Ok(Self::with_repository(config, repository))
    }

    /// Context over a private in-memory database
    pub fn in_memory(config: Config) -> Result<Self> {
        config.validate()?;
        let repository = Arc::new(DuckDbRepository::open_in_memory()?);
        Ok(Self::with_repository(config, repository))
    }

    fn with_repository(config: Config, repository: Arc<DuckDbRepository>) -> Self {
        let store: Arc<dyn LedgerStore> = repository.clone();

        let directory_service = Arc::new(DirectoryService::new(
            Arc::clone(&store),
            config.require_unique_email,
        ));
        let auth_service = AuthService::new(
            Arc::clone(&store),
            Arc::clone(&directory_service),
            config.argon2,
            config.session_ttl(),
        );
        let transaction_service = TransactionService::new(
            Arc::clone(&store),
            Arc::clone(&directory_service),
            config.locale,
        );
        let status_service = StatusService::new(store);

        Self {
            config,
            repository,
            directory_service,
            auth_service,
            transaction_service,
            status_service,
        }
    }
}
