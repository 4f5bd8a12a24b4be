/// serializable read models for the UI, admin screens and the PDF generator
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contract::Contract;
use crate::decimal::{Money, Rate};
use crate::errors::{PresaleError, Result};
use crate::types::{
    ContractId, ContractStatus, PaymentPlan, TransactionId, TransactionType, UserId, WalletId,
    WalletStatus,
};
use crate::wallet::{Wallet, WalletTransaction};

/// serializable view of a contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractView {
    pub id: ContractId,
    pub contract_number: String,
    pub status: ContractStatus,
    pub buyer: BuyerView,
    pub property: PropertyView,
    pub financial: FinancialView,
    pub lifecycle: LifecycleView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyerView {
    pub user_id: UserId,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyView {
    pub title: String,
    pub location: String,
    pub developer: Option<String>,
    pub price_per_sqm: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialView {
    pub purchase_price: Money,
    pub down_payment_percent: u8,
    pub down_payment_amount: Money,
    pub remaining_amount: Money,
    pub payment_plan: PaymentPlan,
    pub installment_months: Option<u32>,
    pub monthly_installment: Option<Money>,
    pub final_installment: Option<Money>,
    pub interest_rate: Rate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleView {
    pub signed_at: Option<DateTime<Utc>>,
    pub withdrawal_deadline: Option<DateTime<Utc>>,
    pub withdrawal_open: bool,
    pub withdrawal_reason: Option<String>,
    pub down_payment_settled: bool,
    pub refunded: Option<Money>,
    pub contract_pdf_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContractView {
    pub fn from_contract(contract: &Contract, now: DateTime<Utc>) -> Self {
        let refunded = contract
            .withdrawal_refund
            .as_ref()
            .or(contract.cancellation_refund.as_ref())
            .map(|r| r.amount);

        ContractView {
            id: contract.id,
            contract_number: contract.contract_number.clone(),
            status: contract.status,
            buyer: BuyerView {
                user_id: contract.buyer_id,
                full_name: contract.buyer.full_name.clone(),
                email: contract.buyer.email.clone(),
                phone: contract.buyer.phone.clone(),
            },
            property: PropertyView {
                title: contract.property.title.clone(),
                location: contract.property.location.clone(),
                developer: contract.developer.as_ref().map(|d| d.name.clone()),
                price_per_sqm: contract.property.price_per_sqm(),
            },
            financial: FinancialView {
                purchase_price: contract.terms.purchase_price,
                down_payment_percent: contract.terms.down_payment_percent,
                down_payment_amount: contract.terms.down_payment_amount,
                remaining_amount: contract.terms.remaining_amount,
                payment_plan: contract.terms.payment_plan,
                installment_months: contract.terms.installment_months,
                monthly_installment: contract.terms.monthly_installment,
                final_installment: contract.terms.final_installment(),
                interest_rate: contract.terms.interest_rate,
            },
            lifecycle: LifecycleView {
                signed_at: contract.signed_at(),
                withdrawal_deadline: contract.withdrawal_deadline,
                withdrawal_open: contract.withdrawal_open(now),
                withdrawal_reason: contract.withdrawal_reason.clone(),
                down_payment_settled: contract.settlement.is_some(),
                refunded,
                contract_pdf_url: contract.contract_pdf_url.clone(),
                created_at: contract.created_at,
                updated_at: contract.updated_at,
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        to_json(self)
    }
}

/// serializable view of a wallet and its recent history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletView {
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub status: WalletStatus,
    pub balance: Money,
    pub bonus_balance: Money,
    pub spendable: Money,
    pub total_deposited: Money,
    pub qualifies_for_interest: bool,
    pub qualified_at: Option<DateTime<Utc>>,
    pub recent_transactions: Vec<TransactionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionView {
    pub id: TransactionId,
    pub transaction_type: TransactionType,
    /// signed by type
    pub amount: Money,
    pub description: String,
    pub contract_id: Option<ContractId>,
    pub created_at: DateTime<Utc>,
}

impl WalletView {
    /// newest `limit` transactions first
    pub fn from_wallet(wallet: &Wallet, transactions: &[WalletTransaction], limit: usize) -> Self {
        let recent_transactions = transactions
            .iter()
            .rev()
            .take(limit)
            .map(|tx| TransactionView {
                id: tx.id,
                transaction_type: tx.transaction_type,
                amount: tx.signed_amount(),
                description: tx.description.clone(),
                contract_id: tx.contract_id,
                created_at: tx.created_at,
            })
            .collect();

        WalletView {
            wallet_id: wallet.id,
            user_id: wallet.user_id,
            status: wallet.status,
            balance: wallet.balance,
            bonus_balance: wallet.bonus_balance,
            spendable: wallet.spendable(),
            total_deposited: wallet.total_deposited,
            qualifies_for_interest: wallet.qualifies_for_interest,
            qualified_at: wallet.qualified_at,
            recent_transactions,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        to_json(self)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| PresaleError::validation(format!("failed to serialize view: {}", e)))
}
