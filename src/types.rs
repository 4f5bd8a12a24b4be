use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// numeric contract identifier, assigned sequentially by the contract book
pub type ContractId = u64;

/// unique identifier for a wallet
pub type WalletId = Uuid;

/// unique identifier for a wallet transaction
pub type TransactionId = Uuid;

/// unique identifier for a deposit request
pub type DepositRequestId = Uuid;

/// owner of a wallet and buyer on a contract
pub type UserId = Uuid;

/// property identifier in the external catalog
pub type PropertyId = u64;

/// developer identifier in the external catalog
pub type DeveloperId = u64;

/// contract lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// created, terms still editable
    Draft,
    /// terms frozen, waiting for the buyer's signature and down payment
    PendingSignature,
    /// signed, down payment arranged outside the wallet
    PendingPayment,
    /// down payment settled
    Active,
    /// fully paid off
    Completed,
    /// buyer exercised the cooling-off right
    Withdrawal,
    /// admin override (breach, fraud)
    Cancelled,
    /// superseded by the final notarial contract
    Converted,
}

impl ContractStatus {
    /// no transition may leave a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContractStatus::Completed
                | ContractStatus::Withdrawal
                | ContractStatus::Cancelled
                | ContractStatus::Converted
        )
    }

    /// transitions allowed by the normal workflow
    pub fn can_transition_to(&self, next: ContractStatus) -> bool {
        use ContractStatus::*;
        matches!(
            (self, next),
            (Draft, PendingSignature)
                | (PendingSignature, Active)
                | (PendingSignature, PendingPayment)
                | (PendingPayment, Active)
                | (Active, Completed)
                | (Active, Withdrawal)
                | (Active, Cancelled)
                | (PendingPayment, Cancelled)
                | (Active, Converted)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::PendingSignature => "pending_signature",
            ContractStatus::PendingPayment => "pending_payment",
            ContractStatus::Active => "active",
            ContractStatus::Completed => "completed",
            ContractStatus::Withdrawal => "withdrawal",
            ContractStatus::Cancelled => "cancelled",
            ContractStatus::Converted => "converted",
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// how the remaining balance is paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPlan {
    Full,
    Installment,
}

/// kind of identity document supplied by the buyer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdDocumentType {
    Passport,
    NationalId,
    DriversLicense,
    ResidencePermit,
}

/// wallet status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    Active,
    Frozen,
    Closed,
}

/// wallet transaction type; the sign of the amount is implied by the type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// cash in, credits balance
    Deposit,
    /// cash out, debits balance
    Withdrawal,
    /// purchase paid from cash balance
    Purchase,
    /// interest credited to bonus balance
    InterestCredit,
    /// purchase paid from bonus balance
    BonusUsed,
    /// cash returned to balance
    Refund,
}

/// which wallet sub-balance a transaction type touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceBucket {
    Cash,
    Bonus,
}

impl TransactionType {
    /// credits increase a balance, debits decrease it
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionType::Deposit | TransactionType::InterestCredit | TransactionType::Refund
        )
    }

    pub fn bucket(&self) -> BalanceBucket {
        match self {
            TransactionType::InterestCredit | TransactionType::BonusUsed => BalanceBucket::Bonus,
            _ => BalanceBucket::Cash,
        }
    }
}

/// wallet transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// funding rail of a deposit request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositMethod {
    BankTransfer,
    CryptoBtc,
    CryptoEth,
    CryptoUsdt,
}

/// deposit request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    /// created by the buyer
    Pending,
    /// payment instructions issued
    AwaitingPayment,
    /// funds seen by an admin, not yet credited
    PaymentReceived,
    /// credited to the wallet
    Completed,
    /// rejected, no ledger effect
    Cancelled,
}

impl DepositStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, DepositStatus::Completed | DepositStatus::Cancelled)
    }
}

/// how a wallet becomes eligible for interest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualificationBasis {
    /// one confirmed deposit at or above the threshold
    SingleDeposit,
    /// lifetime deposits at or above the threshold
    Cumulative,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses_have_no_exits() {
        use ContractStatus::*;
        let all = [
            Draft, PendingSignature, PendingPayment, Active, Completed, Withdrawal, Cancelled,
            Converted,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in all {
                assert!(!from.can_transition_to(to), "{} -> {} allowed", from, to);
            }
        }
    }

    #[test]
    fn test_workflow_transitions() {
        use ContractStatus::*;
        assert!(Draft.can_transition_to(PendingSignature));
        assert!(PendingSignature.can_transition_to(Active));
        assert!(Active.can_transition_to(Withdrawal));
        assert!(!Draft.can_transition_to(Active));
        assert!(!PendingSignature.can_transition_to(Cancelled));
        assert!(!Active.can_transition_to(Draft));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ContractStatus::PendingSignature).unwrap();
        assert_eq!(json, "\"pending_signature\"");
        assert_eq!(ContractStatus::Withdrawal.to_string(), "withdrawal");
    }

    #[test]
    fn test_transaction_buckets() {
        assert_eq!(TransactionType::BonusUsed.bucket(), BalanceBucket::Bonus);
        assert_eq!(TransactionType::Purchase.bucket(), BalanceBucket::Cash);
        assert!(TransactionType::Refund.is_credit());
        assert!(!TransactionType::Withdrawal.is_credit());
    }
}
