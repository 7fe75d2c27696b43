//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
mod credential;
pub mod money;
mod rejection;
pub mod result;
mod transaction;
mod user;

pub use account::{Account, AccountType};
pub use credential::{Argon2Params, Session, SessionToken};
pub use rejection::{Locale, Rejection};
pub use transaction::{
    BalanceChange, LedgerEntry, Transaction, TransactionKind, TransactionRequest,
    MAX_DESCRIPTION_LEN,
};
pub use user::User;
