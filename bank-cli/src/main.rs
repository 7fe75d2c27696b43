//! Bank CLI - accounts and transfers from the terminal

use std::process::ExitCode;

use anyhow::Result;
use bank_core::{LogEvent, TransactionKind};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{account, auth, logs, status, transaction};

/// Bank - users, accounts and transfers in your terminal
#[derive(Parser)]
#[command(name = "bank", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new user
    Register {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Prompted for when omitted
        #[arg(long, env = "BANK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Log in and store the session token
    Login {
        #[arg(long)]
        username: Option<String>,
        /// Prompted for when omitted
        #[arg(long, env = "BANK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// End the current session
    Logout,

    /// Show the logged-in user
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage accounts
    Account {
        #[command(subcommand)]
        command: account::AccountCommands,
    },

    /// Deposit money into an account
    Deposit {
        /// Account ID
        account_id: String,
        /// Amount, e.g. 50 or 12.34
        amount: String,
        #[arg(short, long, default_value = "Deposit")]
        description: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Withdraw money from an account
    Withdraw {
        /// Account ID
        account_id: String,
        /// Amount, e.g. 50 or 12.34
        amount: String,
        #[arg(short, long, default_value = "Withdrawal")]
        description: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transfer money to another account
    Transfer {
        /// Source account ID
        account_id: String,
        /// Amount, e.g. 50 or 12.34
        amount: String,
        /// Destination account ID
        #[arg(long)]
        to: Option<String>,
        #[arg(short, long, default_value = "Transfer")]
        description: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the transactions of an account
    History {
        /// Account ID
        account_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show account summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage application logs
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Register { .. } => "register",
            Commands::Login { .. } => "login",
            Commands::Logout => "logout",
            Commands::Whoami { .. } => "whoami",
            Commands::Account { .. } => "account",
            Commands::Deposit { .. } => "deposit",
            Commands::Withdraw { .. } => "withdraw",
            Commands::Transfer { .. } => "transfer",
            Commands::History { .. } => "history",
            Commands::Status { .. } => "status",
            Commands::Logs { .. } => "logs",
        }
    }
}

/// Diagnostics go to stderr, filtered by `BANK_LOG` (default `warn`)
fn init_tracing() {
    let filter = EnvFilter::try_from_env("BANK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let name = cli.command.name();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Transaction commands record their own failures.
            if !matches!(name, "deposit" | "withdraw" | "transfer") {
                commands::EventLog::open().record(
                    LogEvent::new("command_failed")
                        .with_command(name)
                        .with_error_code(commands::error_code(&e)),
                );
            }
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Register {
            username,
            email,
            password,
            json,
        } => auth::run_register(username, email, password, json),
        Commands::Login {
            username,
            password,
            json,
        } => auth::run_login(username, password, json),
        Commands::Logout => auth::run_logout(),
        Commands::Whoami { json } => auth::run_whoami(json),
        Commands::Account { command } => account::run(command),
        Commands::Deposit {
            account_id,
            amount,
            description,
            json,
        } => transaction::run_post(
            TransactionKind::Deposit,
            &account_id,
            &amount,
            &description,
            None,
            json,
        ),
        Commands::Withdraw {
            account_id,
            amount,
            description,
            json,
        } => transaction::run_post(
            TransactionKind::Withdrawal,
            &account_id,
            &amount,
            &description,
            None,
            json,
        ),
        Commands::Transfer {
            account_id,
            amount,
            to,
            description,
            json,
        } => transaction::run_post(
            TransactionKind::Transfer,
            &account_id,
            &amount,
            &description,
            to.as_deref(),
            json,
        ),
        Commands::History { account_id, json } => transaction::run_history(&account_id, json),
        Commands::Status { json } => status::run(json),
        Commands::Logs { command } => logs::run(command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_transfer_arguments() {
        let cli = Cli::try_parse_from([
            "bank", "transfer", "acc-1", "12.50", "--to", "acc-2", "-d", "rent",
        ])
        .unwrap();
        match cli.command {
            Commands::Transfer {
                account_id,
                amount,
                to,
                description,
                json,
            } => {
                assert_eq!(account_id, "acc-1");
                assert_eq!(amount, "12.50");
                assert_eq!(to.as_deref(), Some("acc-2"));
                assert_eq!(description, "rent");
                assert!(!json);
            }
            _ => panic!("expected transfer"),
        }
    }
}
