//! Status command - summary of the current user's accounts

use anyhow::Result;
use colored::Colorize;

use super::auth::current_user;
use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user = current_user(&ctx)?;
    let status = ctx.status_service.summary(user.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", format!("Status for {}", user.username).bold());
    println!();

    let mut table = output::create_table();
    table.add_row(vec!["Accounts".to_string(), status.total_accounts.to_string()]);
    table.add_row(vec!["Transactions".to_string(), status.total_transactions.to_string()]);
    table.add_row(vec!["Total balance".to_string(), status.total_balance.to_string()]);
    println!("{}", table);

    if !status.accounts.is_empty() {
        println!();
        let mut accounts = output::create_table();
        accounts.set_header(vec!["Account ID", "Type", "Balance", "Transactions", "Last activity"]);
        for line in &status.accounts {
            accounts.add_row(vec![
                line.id.clone(),
                line.account_type.to_string(),
                line.balance.to_string(),
                line.transaction_count.to_string(),
                line.last_activity.clone().unwrap_or_else(|| "-".to_string()),
            ]);
        }
        println!("{}", accounts);
    }

    Ok(())
}
