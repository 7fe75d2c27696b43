//! Status service - per-user account and transaction summaries

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::money;
use crate::domain::result::Result;
use crate::domain::AccountType;
use crate::ports::LedgerStore;

pub struct StatusService {
    store: Arc<dyn LedgerStore>,
}

impl StatusService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Summary of everything `user_id` owns.
    ///
    /// A transfer between two of the user's own accounts counts once.
    pub fn summary(&self, user_id: Uuid) -> Result<StatusSummary> {
        let accounts = self.store.get_user_accounts(user_id)?;

        let mut seen = HashSet::new();
        let mut lines = Vec::with_capacity(accounts.len());
        let mut total_balance = Decimal::ZERO;

        for account in accounts {
            let transactions = self.store.get_account_transactions(account.id)?;
            seen.extend(transactions.iter().map(|tx| tx.id));
            total_balance += account.balance;

            lines.push(AccountSummary {
                id: account.id.to_string(),
                account_type: account.account_type,
                balance: account.balance,
                transaction_count: transactions.len(),
                last_activity: transactions
                    .last()
                    .map(|tx| tx.created_at.to_rfc3339()),
            });
        }

        Ok(StatusSummary {
            total_accounts: lines.len(),
            total_balance: money::to_fixed(total_balance),
            total_transactions: seen.len(),
            accounts: lines,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub total_accounts: usize,
    pub total_balance: Decimal,
    pub total_transactions: usize,
    pub accounts: Vec<AccountSummary>,
}

#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub id: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub transaction_count: usize,
    pub last_activity: Option<String>,
}
