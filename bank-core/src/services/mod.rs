//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod auth;
mod directory;
pub mod logging;
pub mod migration;
mod processor;
mod status;
mod transaction;

pub use auth::{hash_token, AuthService, MIN_PASSWORD_LEN};
pub use directory::DirectoryService;
pub use logging::{EventCount, LogEntry, LogEvent, LogFilter, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use processor::{summarize, Applied, TransactionProcessor};
pub use status::{AccountSummary, StatusService, StatusSummary};
pub use transaction::{Receipt, TransactionService};
