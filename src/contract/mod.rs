//! Pre-purchase contracts.
//!
//! A [`Contract`] is only ever mutated through the transition methods in
//! [`machine`], and only while its [`ContractBook`] lock is held.

pub mod book;
pub mod machine;
pub mod schedule;
pub mod terms;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{Developer, PropertySnapshot};
use crate::decimal::Money;
use crate::errors::{PresaleError, Result};
use crate::types::{
    ContractId, ContractStatus, DeveloperId, IdDocumentType, PropertyId, TransactionId, UserId,
    WalletId,
};

pub use book::ContractBook;
pub use schedule::{InstallmentSchedule, ScheduledInstallment};
pub use terms::{ClientQuote, ContractTerms, TermsRequest};

/// buyer-supplied identity and contact details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyerDetails {
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub id_document_type: Option<IdDocumentType>,
    pub id_document_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub nationality: Option<String>,
}

impl BuyerDetails {
    pub fn new(full_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            email: email.into(),
            phone: None,
            address: None,
            id_document_type: None,
            id_document_number: None,
            date_of_birth: None,
            nationality: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// name and email are the only fields required at creation
    pub fn validate(&self) -> Result<()> {
        if self.full_name.trim().is_empty() {
            return Err(PresaleError::validation("buyer name is required"));
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(PresaleError::validation("a valid buyer email is required"));
        }
        Ok(())
    }

    /// contact fields needed before the contract goes out for signature
    pub fn validate_contact(&self) -> Result<()> {
        self.validate()?;
        match self.phone.as_deref().map(str::trim) {
            Some(phone) if !phone.is_empty() => Ok(()),
            _ => Err(PresaleError::validation(
                "buyer phone is required before requesting a signature",
            )),
        }
    }
}

/// everything needed to open a contract in draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractApplication {
    pub buyer_id: UserId,
    pub property_id: PropertyId,
    pub developer_id: Option<DeveloperId>,
    pub buyer: BuyerDetails,
    pub terms: TermsRequest,
    /// amounts the client form displayed, if any
    pub quote: Option<ClientQuote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    /// encoded signature image as captured by the client
    pub image: String,
    pub signed_at: DateTime<Utc>,
}

/// how the down payment was settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettlementSource {
    Wallet {
        wallet_id: WalletId,
        bonus_used: Money,
        cash_used: Money,
        transaction_ids: Vec<TransactionId>,
    },
    External {
        confirmed_by: String,
        reference: Option<String>,
    },
}

/// receipt for a settled down payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub contract_id: ContractId,
    pub amount: Money,
    pub source: SettlementSource,
    pub settled_at: DateTime<Utc>,
}

impl SettlementRecord {
    /// the wallet transaction a refund should reference
    pub fn wallet_transaction(&self) -> Option<TransactionId> {
        match &self.source {
            SettlementSource::Wallet { transaction_ids, .. } => transaction_ids.last().copied(),
            SettlementSource::External { .. } => None,
        }
    }
}

/// receipt for a down payment returned to the buyer's wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub contract_id: ContractId,
    pub wallet_id: WalletId,
    pub transaction_id: TransactionId,
    pub amount: Money,
    pub reason: String,
    pub reviewed_by: Option<String>,
    pub refunded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: ContractStatus,
    pub to: ContractStatus,
    pub reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub at: DateTime<Utc>,
}

/// a buyer's pre-purchase contract for one property unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub contract_number: String,
    pub buyer_id: UserId,
    pub buyer: BuyerDetails,
    pub property: PropertySnapshot,
    pub developer: Option<Developer>,
    pub terms: ContractTerms,
    pub status: ContractStatus,

    pub signature: Option<Signature>,
    pub withdrawal_deadline: Option<DateTime<Utc>>,
    pub withdrawal_reason: Option<String>,
    pub withdrawal_requested_at: Option<DateTime<Utc>>,

    pub settlement: Option<SettlementRecord>,
    pub withdrawal_refund: Option<RefundRecord>,
    pub cancellation_refund: Option<RefundRecord>,

    pub contract_pdf_url: Option<String>,
    pub status_history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn signed_at(&self) -> Option<DateTime<Utc>> {
        self.signature.as_ref().map(|s| s.signed_at)
    }

    /// still inside the cooling-off window at `now` (deadline inclusive)
    pub fn withdrawal_open(&self, now: DateTime<Utc>) -> bool {
        self.status == ContractStatus::Active
            && self.withdrawal_deadline.is_some_and(|deadline| now <= deadline)
    }

    /// dated installments starting from `start`, if on an installment plan
    pub fn installment_schedule(&self, start: DateTime<Utc>) -> Result<Option<InstallmentSchedule>> {
        match self.terms.installment_months {
            Some(months) => InstallmentSchedule::generate(
                self.id,
                self.terms.remaining_amount,
                self.terms.interest_rate,
                months,
                start,
            )
            .map(Some),
            None => Ok(None),
        }
    }

    /// re-derive every amount from the frozen price and fail on any mismatch
    pub fn recompute_and_verify(&self) -> Result<()> {
        if self.terms.purchase_price != self.property.price {
            return Err(PresaleError::FinancialDrift {
                contract_id: self.id,
                field: "purchase_price".to_string(),
                stored: self.terms.purchase_price,
                expected: self.property.price,
            });
        }
        self.terms.verify(self.id)
    }
}
