//! Transaction domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money;
use super::result::{Error, Result};
use super::{Locale, Rejection};

/// Longest description accepted on a transaction
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// The closed set of balance mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
        }
    }

    /// Message shown to the client when a mutation of this kind succeeds
    pub fn success_message(&self, locale: Locale) -> &'static str {
        match (locale, self) {
            (Locale::En, TransactionKind::Deposit) => "Deposit completed successfully",
            (Locale::En, TransactionKind::Withdrawal) => "Withdrawal completed successfully",
            (Locale::En, TransactionKind::Transfer) => "Transfer completed successfully",
            (Locale::PtBr, TransactionKind::Deposit) => "Depósito realizado com sucesso",
            (Locale::PtBr, TransactionKind::Withdrawal) => "Saque realizado com sucesso",
            (Locale::PtBr, TransactionKind::Transfer) => "Transferência realizada com sucesso",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = Rejection;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            "transfer" => Ok(TransactionKind::Transfer),
            _ => Err(Rejection::InvalidTransactionType),
        }
    }
}

/// An append-only ledger record, written once per applied mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Insertion order assigned by the store (0 until persisted)
    pub sequence: i64,
    /// Source account
    pub account_id: Uuid,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
    /// Destination account, present iff `kind` is a transfer
    pub to_account_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        account_id: Uuid,
        kind: TransactionKind,
        amount: Decimal,
        description: impl Into<String>,
        to_account_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            account_id,
            kind,
            amount: money::to_fixed(amount),
            description: description.into(),
            to_account_id,
            created_at: Utc::now(),
        }
    }

    /// True if the account is the source or the destination
    pub fn involves(&self, account_id: Uuid) -> bool {
        self.account_id == account_id || self.to_account_id == Some(account_id)
    }
}

/// A client request to mutate an account balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
    /// Destination account reference as typed by the client
    pub to_account: Option<String>,
}

impl TransactionRequest {
    pub fn new(kind: TransactionKind, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            kind,
            amount,
            description: description.into(),
            to_account: None,
        }
    }

    pub fn deposit(amount: Decimal, description: impl Into<String>) -> Self {
        Self::new(TransactionKind::Deposit, amount, description)
    }

    pub fn withdrawal(amount: Decimal, description: impl Into<String>) -> Self {
        Self::new(TransactionKind::Withdrawal, amount, description)
    }

    pub fn transfer(
        amount: Decimal,
        description: impl Into<String>,
        to_account: impl Into<String>,
    ) -> Self {
        let mut request = Self::new(TransactionKind::Transfer, amount, description);
        request.to_account = Some(to_account.into());
        request
    }

    /// Build a request from raw client strings
    pub fn parse(
        kind: &str,
        amount: &str,
        description: &str,
        to_account: Option<&str>,
    ) -> Result<Self> {
        let kind: TransactionKind = kind.parse()?;
        let amount = money::parse_amount(amount)?;
        Ok(Self {
            kind,
            amount,
            description: description.to_string(),
            to_account: to_account.map(str::to_string),
        })
    }

    /// Check the request shape before any balance is touched.
    ///
    /// The destination is dropped for non-transfer kinds and blank
    /// references are treated as missing.
    pub fn validated(mut self) -> Result<Self> {
        self.amount = money::check_amount(self.amount)?;

        let description = self.description.trim();
        if description.is_empty() {
            return Err(Error::validation("description is required"));
        }
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(Error::validation(format!(
                "description must be at most {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
        self.description = description.to_string();

        self.to_account = match self.kind {
            TransactionKind::Transfer => self
                .to_account
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
            _ => None,
        };
        Ok(self)
    }

    /// Destination id, if the reference is a well-formed account id
    pub fn destination_id(&self) -> Option<Uuid> {
        self.to_account
            .as_deref()
            .and_then(|r| Uuid::parse_str(r.trim()).ok())
    }
}

/// One account balance moving from `previous` to `current`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub account_id: Uuid,
    pub previous: Decimal,
    pub current: Decimal,
}

/// Everything that must be persisted together for one applied mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub transaction: Transaction,
    pub changes: Vec<BalanceChange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Deposit".parse::<TransactionKind>(), Ok(TransactionKind::Deposit));
        assert_eq!(
            "refund".parse::<TransactionKind>(),
            Err(Rejection::InvalidTransactionType)
        );
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        let err = TransactionRequest::parse("loan", "10", "x", None).unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::InvalidTransactionType));
    }

    #[test]
    fn test_validated_drops_destination_for_deposit() {
        let mut request = TransactionRequest::deposit(Decimal::new(500, 2), "  cash  ");
        request.to_account = Some(Uuid::new_v4().to_string());
        let request = request.validated().unwrap();
        assert_eq!(request.to_account, None);
        assert_eq!(request.description, "cash");
    }

    #[test]
    fn test_validated_blank_destination_is_missing() {
        let request = TransactionRequest::transfer(Decimal::ONE, "rent", "   ")
            .validated()
            .unwrap();
        assert_eq!(request.to_account, None);
    }

    #[test]
    fn test_validated_requires_description_and_positive_amount() {
        assert!(TransactionRequest::deposit(Decimal::ONE, " ").validated().is_err());
        assert!(TransactionRequest::deposit(Decimal::ZERO, "x").validated().is_err());
        assert!(TransactionRequest::deposit(Decimal::NEGATIVE_ONE, "x")
            .validated()
            .is_err());
    }

    #[test]
    fn test_involves_source_and_destination() {
        let source = Uuid::new_v4();
        let destination = Uuid::new_v4();
        let tx = Transaction::new(
            source,
            TransactionKind::Transfer,
            Decimal::ONE,
            "split",
            Some(destination),
        );
        assert!(tx.involves(source));
        assert!(tx.involves(destination));
        assert!(!tx.involves(Uuid::new_v4()));
    }

    #[test]
    fn test_success_messages() {
        assert_eq!(
            TransactionKind::Withdrawal.success_message(Locale::PtBr),
            "Saque realizado com sucesso"
        );
    }
}
