//! Transaction commands - deposit, withdraw, transfer, history

use anyhow::{anyhow, Result};
use bank_core::{
    BankContext, Error, LogEvent, OperationResult, TransactionKind, TransactionRequest,
};

use super::auth::current_user;
use super::{error_code, get_context, parse_id, EventLog};
use crate::output;

/// Post one transaction against an account the current user owns
pub fn run_post(
    kind: TransactionKind,
    account_id: &str,
    amount: &str,
    description: &str,
    to_account: Option<&str>,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let locale = ctx.transaction_service.locale();
    let events = EventLog::open();
    let event = |name: &str| {
        LogEvent::new(name)
            .with_command(kind.as_str())
            .with_transaction_kind(kind)
    };

    match post(&ctx, kind, account_id, amount, description, to_account) {
        Ok(receipt) => {
            events.record(event("transaction_posted"));

            if json {
                println!("{}", serde_json::to_string_pretty(&OperationResult::ok(&receipt))?);
            } else {
                output::success(&receipt.message);
                println!("  Transaction ID: {}", receipt.transaction.id);
                println!("  New balance: {}", receipt.new_balance);
            }
            Ok(())
        }
        Err(err) => {
            let code = error_code(&err);
            events.record(event("transaction_failed").with_error_code(code));

            // Core errors get their localized text; CLI errors keep their chain.
            let message = match err.downcast_ref::<Error>() {
                Some(core) => core.user_message(locale),
                None => format!("{:#}", err),
            };
            if json {
                let result = OperationResult::<()>::fail(code, message.as_str());
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            Err(anyhow!(message))
        }
    }
}

fn post(
    ctx: &BankContext,
    kind: TransactionKind,
    account_id: &str,
    amount: &str,
    description: &str,
    to_account: Option<&str>,
) -> Result<bank_core::services::Receipt> {
    let user = current_user(ctx)?;
    let account_id = parse_id(account_id, "account")?;
    let request = TransactionRequest::parse(kind.as_str(), amount, description, to_account)?;
    Ok(ctx.transaction_service.post(user.id, account_id, request)?)
}

pub fn run_history(account_id: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user = current_user(&ctx)?;
    let account_id = parse_id(account_id, "account")?;
    let transactions = ctx.transaction_service.history(user.id, account_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&transactions)?);
        return Ok(());
    }

    if transactions.is_empty() {
        output::info("No transactions for this account.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["#", "Time", "Kind", "Amount", "Counterparty", "Description"]);
    for tx in &transactions {
        // Incoming transfers show the sender; outgoing ones the recipient.
        let (incoming, counterparty) = match tx.to_account_id {
            Some(to) if to == account_id => (true, format!("from {}", tx.account_id)),
            Some(to) => (false, format!("to {}", to)),
            None => (tx.kind != TransactionKind::Withdrawal, String::new()),
        };
        table.add_row(vec![
            tx.sequence.to_string(),
            tx.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            tx.kind.to_string(),
            output::signed_amount(tx.amount, incoming),
            counterparty,
            tx.description.clone(),
        ]);
    }
    println!("{}", table);
    Ok(())
}
