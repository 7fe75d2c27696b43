//! Account domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money;
use super::Rejection;

/// Kind of account a customer can open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Savings,
    Checking,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Savings => "savings",
            AccountType::Checking => "checking",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "savings" => Ok(AccountType::Savings),
            "checking" => Ok(AccountType::Checking),
            other => Err(format!("invalid account type: '{}'", other)),
        }
    }
}

/// A bank account owned by a single user.
///
/// The balance only changes through the transaction processor, which uses
/// [`Account::credited`] and [`Account::debited`] to compute the new value
/// before assigning it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Open a new account with a zero balance
    pub fn new(user_id: Uuid, account_type: AccountType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            account_type,
            balance: money::to_fixed(Decimal::ZERO),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    /// Balance after adding `amount`, without mutating the account
    pub fn credited(&self, amount: Decimal) -> Result<Decimal, Rejection> {
        match self.balance.checked_add(amount) {
            Some(total) if total <= money::max_amount() => Ok(money::to_fixed(total)),
            _ => Err(Rejection::BalanceOverflow),
        }
    }

    /// Balance after removing `amount`; the account may be drawn to exactly zero
    pub fn debited(&self, amount: Decimal) -> Result<Decimal, Rejection> {
        if self.balance < amount {
            return Err(Rejection::InsufficientFunds);
        }
        Ok(money::to_fixed(self.balance - amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_with(balance: i64) -> Account {
        let mut account = Account::new(Uuid::new_v4(), AccountType::Checking);
        account.balance = Decimal::new(balance, 2);
        account
    }

    #[test]
    fn test_new_account_starts_at_zero() {
        let account = Account::new(Uuid::new_v4(), AccountType::Savings);
        assert_eq!(account.balance.to_string(), "0.00");
    }

    #[test]
    fn test_account_type_parsing() {
        assert_eq!("Savings".parse::<AccountType>().unwrap(), AccountType::Savings);
        assert_eq!(" checking ".parse::<AccountType>().unwrap(), AccountType::Checking);
        assert!("brokerage".parse::<AccountType>().is_err());
    }

    #[test]
    fn test_debit_allows_exact_balance() {
        let account = account_with(10000);
        assert_eq!(account.debited(Decimal::new(10000, 2)).unwrap(), Decimal::ZERO);
        assert_eq!(
            account.debited(Decimal::new(10001, 2)),
            Err(Rejection::InsufficientFunds)
        );
    }

    #[test]
    fn test_credit_overflow_is_rejected() {
        let mut account = account_with(0);
        account.balance = money::max_amount();
        assert_eq!(
            account.credited(Decimal::new(1, 2)),
            Err(Rejection::BalanceOverflow)
        );
    }
}
