//! Processor rejections and their user-facing messages

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Language used for messages returned to clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "en")]
    En,
    #[serde(rename = "pt-br")]
    PtBr,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::PtBr => "pt-br",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "en" | "en-us" | "en-gb" => Ok(Locale::En),
            "pt" | "pt-br" => Ok(Locale::PtBr),
            other => Err(format!("unsupported locale: {}", other)),
        }
    }
}

/// Why the transaction processor refused to apply a request.
///
/// No balance is mutated when any of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    #[error("invalid transaction type")]
    InvalidTransactionType,

    #[error("recipient account not specified")]
    RecipientNotSpecified,

    #[error("cannot transfer to the same account")]
    SelfTransfer,

    #[error("recipient account not found")]
    RecipientNotFound,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("resulting balance exceeds the maximum supported value")]
    BalanceOverflow,
}

impl Rejection {
    /// True for malformed requests, false for business-rule failures
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Rejection::InvalidTransactionType
                | Rejection::RecipientNotSpecified
                | Rejection::SelfTransfer
        )
    }

    /// Stable identifier, safe to write to the event log
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::InvalidTransactionType => "invalid_transaction_type",
            Rejection::RecipientNotSpecified => "recipient_not_specified",
            Rejection::SelfTransfer => "self_transfer",
            Rejection::RecipientNotFound => "recipient_not_found",
            Rejection::InsufficientFunds => "insufficient_funds",
            Rejection::BalanceOverflow => "balance_overflow",
        }
    }

    pub fn message(&self, locale: Locale) -> &'static str {
        match (locale, self) {
            (Locale::En, Rejection::InvalidTransactionType) => "Invalid transaction type",
            (Locale::En, Rejection::RecipientNotSpecified) => "Recipient account not specified",
            (Locale::En, Rejection::SelfTransfer) => "Cannot transfer to the same account",
            (Locale::En, Rejection::RecipientNotFound) => "Recipient account not found",
            (Locale::En, Rejection::InsufficientFunds) => "Insufficient funds",
            (Locale::En, Rejection::BalanceOverflow) => {
                "Resulting balance exceeds the maximum supported value"
            }
            (Locale::PtBr, Rejection::InvalidTransactionType) => "Tipo de transação inválido",
            (Locale::PtBr, Rejection::RecipientNotSpecified) => {
                "Número da conta de destino não especificado"
            }
            (Locale::PtBr, Rejection::SelfTransfer) => {
                "Não é possível transferir para a mesma conta"
            }
            (Locale::PtBr, Rejection::RecipientNotFound) => "Conta de destino não encontrada",
            (Locale::PtBr, Rejection::InsufficientFunds) => "Saldo insuficiente",
            (Locale::PtBr, Rejection::BalanceOverflow) => {
                "Saldo resultante excede o valor máximo suportado"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_parsing() {
        assert_eq!("en".parse::<Locale>().unwrap(), Locale::En);
        assert_eq!("PT_BR".parse::<Locale>().unwrap(), Locale::PtBr);
        assert_eq!("pt".parse::<Locale>().unwrap(), Locale::PtBr);
        assert!("fr".parse::<Locale>().is_err());
    }

    #[test]
    fn test_validation_classification() {
        assert!(Rejection::InvalidTransactionType.is_validation());
        assert!(Rejection::RecipientNotSpecified.is_validation());
        assert!(!Rejection::InsufficientFunds.is_validation());
        assert!(!Rejection::RecipientNotFound.is_validation());
    }

    #[test]
    fn test_localized_messages() {
        assert_eq!(Rejection::InsufficientFunds.message(Locale::En), "Insufficient funds");
        assert_eq!(Rejection::InsufficientFunds.message(Locale::PtBr), "Saldo insuficiente");
        assert_eq!(
            Rejection::RecipientNotFound.message(Locale::PtBr),
            "Conta de destino não encontrada"
        );
    }
}
