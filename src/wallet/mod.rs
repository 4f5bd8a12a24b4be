pub mod ledger;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{
    BalanceBucket, ContractId, DepositMethod, DepositRequestId, DepositStatus, TransactionId,
    TransactionStatus, TransactionType, UserId, WalletId, WalletStatus,
};

pub use ledger::{PurchaseDebit, WalletLedger};

/// a user's wallet: withdrawable cash plus purchase-only bonus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Money,
    pub bonus_balance: Money,
    pub total_deposited: Money,
    pub qualifies_for_interest: bool,
    pub qualified_at: Option<DateTime<Utc>>,
    pub status: WalletStatus,
    /// start of the current, not yet credited, interest period
    pub interest_period_start: Option<DateTime<Utc>>,
    /// cash balance snapshot taken at the start of the current period
    pub interest_principal: Money,
    /// when the wallet last left `active`
    pub suspended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance: Money::ZERO,
            bonus_balance: Money::ZERO,
            total_deposited: Money::ZERO,
            qualifies_for_interest: false,
            qualified_at: None,
            status: WalletStatus::Active,
            interest_period_start: None,
            interest_principal: Money::ZERO,
            suspended_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// everything spendable on a purchase
    pub fn spendable(&self) -> Money {
        self.balance + self.bonus_balance
    }

    pub fn is_active(&self) -> bool {
        self.status == WalletStatus::Active
    }

    /// restart the interest period at `now` with the current cash balance
    pub(crate) fn restart_interest_period(&mut self, now: DateTime<Utc>) {
        if self.qualifies_for_interest {
            self.interest_period_start = Some(now);
            self.interest_principal = self.balance;
        }
    }
}

/// append-only wallet ledger entry; the amount is always positive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub status: TransactionStatus,
    pub description: String,
    pub contract_id: Option<ContractId>,
    pub deposit_request_id: Option<DepositRequestId>,
    /// the transaction this one reverses, for refunds
    pub related_transaction: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn completed(
        wallet_id: WalletId,
        transaction_type: TransactionType,
        amount: Money,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            transaction_type,
            amount,
            status: TransactionStatus::Completed,
            description: description.into(),
            contract_id: None,
            deposit_request_id: None,
            related_transaction: None,
            created_at,
        }
    }

    pub fn for_contract(mut self, contract_id: Option<ContractId>) -> Self {
        self.contract_id = contract_id;
        self
    }

    /// amount with the sign implied by the type
    pub fn signed_amount(&self) -> Money {
        if self.transaction_type.is_credit() {
            self.amount
        } else {
            Money::ZERO - self.amount
        }
    }
}

/// buyer-initiated request to fund a wallet, confirmed by an admin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub id: DepositRequestId,
    pub wallet_id: WalletId,
    pub amount: Money,
    pub method: DepositMethod,
    pub status: DepositStatus,
    /// bank memo or transaction hash
    pub external_reference: Option<String>,
    pub reviewed_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub transaction_id: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DepositRequest {
    pub fn new(wallet_id: WalletId, amount: Money, method: DepositMethod, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            amount,
            method,
            status: DepositStatus::Pending,
            external_reference: None,
            reviewed_by: None,
            rejection_reason: None,
            transaction_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// comparison of the transaction log against the stored balances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub wallet_id: WalletId,
    pub ledger_cash: Money,
    pub ledger_bonus: Money,
    pub balance: Money,
    pub bonus_balance: Money,
}

impl Reconciliation {
    pub fn from_log(wallet: &Wallet, transactions: &[WalletTransaction]) -> Self {
        let mut ledger_cash = Money::ZERO;
        let mut ledger_bonus = Money::ZERO;

        for tx in transactions
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Completed)
        {
            match tx.transaction_type.bucket() {
                BalanceBucket::Cash => ledger_cash += tx.signed_amount(),
                BalanceBucket::Bonus => ledger_bonus += tx.signed_amount(),
            }
        }

        Self {
            wallet_id: wallet.id,
            ledger_cash,
            ledger_bonus,
            balance: wallet.balance,
            bonus_balance: wallet.bonus_balance,
        }
    }

    pub fn ledger_total(&self) -> Money {
        self.ledger_cash + self.ledger_bonus
    }

    pub fn is_balanced(&self) -> bool {
        self.ledger_cash == self.balance && self.ledger_bonus == self.bonus_balance
    }
}
