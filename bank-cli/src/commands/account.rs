//! Account commands - open and list accounts

use anyhow::{anyhow, Result};
use bank_core::{AccountType, LogEvent};
use clap::Subcommand;
use colored::Colorize;

use super::auth::current_user;
use super::{get_context, EventLog};
use crate::output;

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account with a zero balance
    New {
        /// Account type (savings, checking)
        #[arg(long = "type", default_value = "checking")]
        account_type: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List your accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: AccountCommands) -> Result<()> {
    match command {
        AccountCommands::New { account_type, json } => run_new(&account_type, json),
        AccountCommands::List { json } => run_list(json),
    }
}

fn run_new(account_type: &str, json: bool) -> Result<()> {
    let account_type: AccountType = account_type.parse().map_err(|e: String| anyhow!(e))?;
    let ctx = get_context()?;
    let user = current_user(&ctx)?;

    let account = ctx.directory_service.create_account(user.id, account_type)?;
    EventLog::open().record(LogEvent::new("account_created").with_command("account new"));

    if json {
        println!("{}", serde_json::to_string_pretty(&account)?);
    } else {
        println!("{}", "Account opened".green());
        println!("  Account ID: {}", account.id);
        println!("  Type: {}", account.account_type);
        println!("  Balance: {}", account.balance);
    }
    Ok(())
}

fn run_list(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user = current_user(&ctx)?;
    let accounts = ctx.directory_service.list_accounts(user.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
        return Ok(());
    }

    if accounts.is_empty() {
        output::info("No accounts yet. Open one with `bank account new`.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Account ID", "Type", "Balance", "Opened"]);
    for account in &accounts {
        table.add_row(vec![
            account.id.to_string(),
            account.account_type.to_string(),
            account.balance.to_string(),
            account.created_at.format("%Y-%m-%d").to_string(),
        ]);
    }
    println!("{}", table);
    Ok(())
}
