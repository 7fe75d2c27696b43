//! Transaction processor - applies one balance mutation in memory
//!
//! The processor decides whether a deposit, withdrawal or transfer is
//! allowed and computes the new balances. It never writes; the caller hands
//! the resulting [`LedgerEntry`] to [`LedgerStore::commit`].

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::money;
use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, BalanceChange, LedgerEntry, Locale, Rejection, Transaction, TransactionKind,
    TransactionRequest,
};
use crate::ports::LedgerStore;

/// Outcome of a mutation that passed every rule
#[derive(Debug, Clone)]
pub struct Applied {
    /// Record to append, not yet sequenced
    pub transaction: Transaction,
    /// Balance moves, source first
    pub changes: Vec<BalanceChange>,
    /// Destination account after crediting, transfers only
    pub destination: Option<Account>,
}

impl Applied {
    pub fn kind(&self) -> TransactionKind {
        self.transaction.kind
    }

    pub fn message(&self, locale: Locale) -> &'static str {
        self.kind().success_message(locale)
    }

    pub fn into_entry(self) -> LedgerEntry {
        LedgerEntry {
            transaction: self.transaction,
            changes: self.changes,
        }
    }
}

/// Collapse a processor outcome to `(success, message)`
pub fn summarize(result: &Result<Applied>, locale: Locale) -> (bool, String) {
    match result {
        Ok(applied) => (true, applied.message(locale).to_string()),
        Err(Error::Rejected(rejection)) => (false, rejection.message(locale).to_string()),
        Err(other) => (false, other.to_string()),
    }
}

pub struct TransactionProcessor {
    store: Arc<dyn LedgerStore>,
}

impl TransactionProcessor {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Apply `request` to `account`.
    ///
    /// On success the source balance (and for transfers the destination
    /// balance in [`Applied::destination`]) is already updated in memory. On
    /// any error nothing has been mutated.
    pub fn apply(&self, account: &mut Account, request: &TransactionRequest) -> Result<Applied> {
        let amount = money::check_amount(request.amount)?;

        match request.kind {
            TransactionKind::Deposit => {
                let current = account.credited(amount)?;
                Ok(self.single(account, request, amount, current))
            }
            TransactionKind::Withdrawal => {
                let current = account.debited(amount)?;
                Ok(self.single(account, request, amount, current))
            }
            TransactionKind::Transfer => self.transfer(account, request, amount),
        }
    }

    fn single(
        &self,
        account: &mut Account,
        request: &TransactionRequest,
        amount: Decimal,
        current: Decimal,
    ) -> Applied {
        let change = BalanceChange {
            account_id: account.id,
            previous: account.balance,
            current,
        };
        account.balance = current;

        Applied {
            transaction: Transaction::new(
                account.id,
                request.kind,
                amount,
                request.description.as_str(),
                None,
            ),
            changes: vec![change],
            destination: None,
        }
    }

    fn transfer(
        &self,
        source: &mut Account,
        request: &TransactionRequest,
        amount: Decimal,
    ) -> Result<Applied> {
        let reference = request
            .to_account
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or(Rejection::RecipientNotSpecified)?;

        let destination_id = match Uuid::parse_str(reference) {
            Ok(id) if id == source.id => return Err(Rejection::SelfTransfer.into()),
            Ok(id) => id,
            Err(_) => return Err(Rejection::RecipientNotFound.into()),
        };

        let mut destination = self
            .store
            .get_account(destination_id)?
            .ok_or(Rejection::RecipientNotFound)?;

        // Both balances are computed before either is assigned.
        let source_balance = source.debited(amount)?;
        let destination_balance = destination.credited(amount)?;

        let changes = vec![
            BalanceChange {
                account_id: source.id,
                previous: source.balance,
                current: source_balance,
            },
            BalanceChange {
                account_id: destination.id,
                previous: destination.balance,
                current: destination_balance,
            },
        ];
        source.balance = source_balance;
        destination.balance = destination_balance;

        Ok(Applied {
            transaction: Transaction::new(
                source.id,
                TransactionKind::Transfer,
                amount,
                request.description.as_str(),
                Some(destination.id),
            ),
            changes,
            destination: Some(destination),
        })
    }
}
