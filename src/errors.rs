use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decimal::Money;
use crate::types::{
    ContractId, ContractStatus, DepositRequestId, PropertyId, WalletId, WalletStatus,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PresaleError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
    },

    #[error("invalid transition for contract {contract_id}: {from} -> {to}")]
    InvalidTransition {
        contract_id: ContractId,
        from: ContractStatus,
        to: ContractStatus,
    },

    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Money,
        requested: Money,
    },

    #[error("withdrawal window closed: deadline {deadline}, current time {current_time}")]
    WithdrawalWindowClosed {
        deadline: DateTime<Utc>,
        current_time: DateTime<Utc>,
    },

    #[error("already processed: {message}")]
    AlreadyProcessed {
        message: String,
    },

    #[error("contract {contract_id} not ready for payment: status {status}, signed {signed}")]
    NotReadyForPayment {
        contract_id: ContractId,
        status: ContractStatus,
        signed: bool,
    },

    #[error("external service failure: {service}: {message}")]
    ExternalServiceFailure {
        service: String,
        message: String,
    },

    #[error("contract not found: {id}")]
    ContractNotFound {
        id: ContractId,
    },

    #[error("wallet not found: {id}")]
    WalletNotFound {
        id: WalletId,
    },

    #[error("deposit request not found: {id}")]
    DepositRequestNotFound {
        id: DepositRequestId,
    },

    #[error("property not found: {id}")]
    PropertyNotFound {
        id: PropertyId,
    },

    #[error("wallet {id} not active: current status is {status:?}")]
    WalletNotActive {
        id: WalletId,
        status: WalletStatus,
    },

    #[error("financial drift on contract {contract_id}: {field} stored {stored}, expected {expected}")]
    FinancialDrift {
        contract_id: ContractId,
        field: String,
        stored: Money,
        expected: Money,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, PresaleError>;

/// stable error codes exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    InvalidTransition,
    InsufficientFunds,
    WithdrawalWindowClosed,
    AlreadyProcessed,
    NotReadyForPayment,
    ExternalServiceFailure,
    NotFound,
    WalletNotActive,
    IntegrityViolation,
}

impl PresaleError {
    pub fn validation(message: impl Into<String>) -> Self {
        PresaleError::Validation {
            message: message.into(),
        }
    }

    pub fn already_processed(message: impl Into<String>) -> Self {
        PresaleError::AlreadyProcessed {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PresaleError::Validation { .. } | PresaleError::InvalidConfiguration { .. } => {
                ErrorKind::ValidationError
            }
            PresaleError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            PresaleError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            PresaleError::WithdrawalWindowClosed { .. } => ErrorKind::WithdrawalWindowClosed,
            PresaleError::AlreadyProcessed { .. } => ErrorKind::AlreadyProcessed,
            PresaleError::NotReadyForPayment { .. } => ErrorKind::NotReadyForPayment,
            PresaleError::ExternalServiceFailure { .. } => ErrorKind::ExternalServiceFailure,
            PresaleError::ContractNotFound { .. }
            | PresaleError::WalletNotFound { .. }
            | PresaleError::DepositRequestNotFound { .. }
            | PresaleError::PropertyNotFound { .. } => ErrorKind::NotFound,
            PresaleError::WalletNotActive { .. } => ErrorKind::WalletNotActive,
            PresaleError::FinancialDrift { .. } => ErrorKind::IntegrityViolation,
        }
    }

    /// plain-language reason shown to buyers
    pub fn buyer_message(&self) -> String {
        match self {
            PresaleError::Validation { message } => format!("Please check your details: {}", message),
            PresaleError::InvalidTransition { .. } => {
                "This action is not available for the contract in its current state.".to_string()
            }
            PresaleError::InsufficientFunds { .. } => {
                "Insufficient balance in your wallet to complete this payment.".to_string()
            }
            PresaleError::WithdrawalWindowClosed { .. } => {
                "The withdrawal period for this contract has ended.".to_string()
            }
            PresaleError::AlreadyProcessed { .. } => {
                "This request has already been processed.".to_string()
            }
            PresaleError::NotReadyForPayment { .. } => {
                "The contract must be signed before the down payment can be made.".to_string()
            }
            PresaleError::WalletNotActive { .. } => {
                "Your wallet is currently unavailable. Please contact support.".to_string()
            }
            PresaleError::ContractNotFound { .. }
            | PresaleError::WalletNotFound { .. }
            | PresaleError::DepositRequestNotFound { .. }
            | PresaleError::PropertyNotFound { .. } => {
                "The requested record could not be found.".to_string()
            }
            PresaleError::ExternalServiceFailure { .. }
            | PresaleError::FinancialDrift { .. }
            | PresaleError::InvalidConfiguration { .. } => {
                "Something went wrong on our side. Please try again later.".to_string()
            }
        }
    }
}

/// error detail shown to admins: raw kind plus the affected entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminErrorReport {
    pub kind: ErrorKind,
    pub entity: String,
    pub detail: String,
}

impl AdminErrorReport {
    pub fn new(error: &PresaleError, entity: impl Into<String>) -> Self {
        Self {
            kind: error.kind(),
            entity: entity.into(),
            detail: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_messages() {
        let err = PresaleError::InsufficientFunds {
            available: Money::from_major(100),
            requested: Money::from_major(150),
        };
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert!(err.buyer_message().contains("Insufficient balance"));
        assert_eq!(
            err.to_string(),
            "insufficient funds: available 100.00, requested 150.00"
        );
    }

    #[test]
    fn test_admin_report_carries_entity_and_detail() {
        let err = PresaleError::InvalidTransition {
            contract_id: 7,
            from: ContractStatus::Completed,
            to: ContractStatus::Active,
        };
        let report = AdminErrorReport::new(&err, "contract:7");
        assert_eq!(report.kind, ErrorKind::InvalidTransition);
        assert_eq!(report.entity, "contract:7");
        assert_eq!(report.detail, "invalid transition for contract 7: completed -> active");
    }
}
