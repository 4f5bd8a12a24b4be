//! Contract lifecycle transitions.
//!
//! Each method validates against the current status before touching the
//! contract, re-verifies the derived amounts, and records one
//! `ContractStatusChanged` event per status change. Callers run these on a
//! scratch copy and only commit it when the method returns `Ok`.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::{
    BuyerDetails, Contract, ContractTerms, RefundRecord, SettlementRecord, Signature, StatusChange,
    TermsRequest,
};
use crate::config::ContractConfig;
use crate::errors::{PresaleError, Result};
use crate::events::{Event, EventStore};
use crate::types::ContractStatus;

impl Contract {
    fn ensure_status(&self, expected: &[ContractStatus], to: ContractStatus) -> Result<()> {
        if expected.contains(&self.status) {
            Ok(())
        } else {
            Err(self.invalid_transition(to))
        }
    }

    fn invalid_transition(&self, to: ContractStatus) -> PresaleError {
        PresaleError::InvalidTransition {
            contract_id: self.id,
            from: self.status,
            to,
        }
    }

    fn transition(
        &mut self,
        to: ContractStatus,
        reason: Option<String>,
        reviewed_by: Option<String>,
        now: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Result<()> {
        self.recompute_and_verify()?;

        let from = self.status;
        self.status = to;
        self.updated_at = now;
        self.status_history.push(StatusChange {
            from,
            to,
            reason: reason.clone(),
            reviewed_by: reviewed_by.clone(),
            at: now,
        });

        events.emit(Event::ContractStatusChanged {
            contract_id: self.id,
            old_status: from,
            new_status: to,
            reason,
            reviewed_by,
            timestamp: now,
        });
        info!(contract_id = self.id, %from, %to, "contract status changed");
        Ok(())
    }

    /// draft only; replaces the terms and recomputes every amount
    pub fn update_draft_terms(
        &mut self,
        request: &TermsRequest,
        config: &ContractConfig,
        now: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Result<()> {
        if self.status != ContractStatus::Draft {
            return Err(PresaleError::validation(format!(
                "terms of contract {} are frozen once it leaves draft",
                self.id
            )));
        }
        let terms = ContractTerms::compute(&self.property, request, config)?;

        self.terms = terms;
        self.updated_at = now;
        events.emit(Event::ContractTermsUpdated {
            contract_id: self.id,
            down_payment_amount: self.terms.down_payment_amount,
            remaining_amount: self.terms.remaining_amount,
            timestamp: now,
        });
        Ok(())
    }

    /// draft only
    pub fn update_buyer_details(&mut self, buyer: BuyerDetails, now: DateTime<Utc>) -> Result<()> {
        if self.status != ContractStatus::Draft {
            return Err(PresaleError::validation(format!(
                "buyer details of contract {} are frozen once it leaves draft",
                self.id
            )));
        }
        buyer.validate()?;
        self.buyer = buyer;
        self.updated_at = now;
        Ok(())
    }

    /// draft -> pending_signature
    pub fn request_signature(&mut self, now: DateTime<Utc>, events: &mut EventStore) -> Result<()> {
        self.ensure_status(&[ContractStatus::Draft], ContractStatus::PendingSignature)?;
        self.buyer.validate_contact()?;
        self.transition(ContractStatus::PendingSignature, None, None, now, events)
    }

    /// attach the buyer's signature and open the cooling-off window;
    /// the status stays `pending_signature` until the down payment settles
    pub fn sign(
        &mut self,
        signature_image: &str,
        config: &ContractConfig,
        now: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Result<()> {
        if self.status != ContractStatus::PendingSignature {
            return Err(PresaleError::validation(format!(
                "contract {} is {} and cannot be signed",
                self.id, self.status
            )));
        }
        if self.signature.is_some() {
            return Err(PresaleError::already_processed(format!(
                "contract {} is already signed",
                self.id
            )));
        }
        if signature_image.trim().is_empty() {
            return Err(PresaleError::validation("signature image is empty"));
        }
        self.recompute_and_verify()?;

        let deadline = Duration::try_days(config.withdrawal_window_days)
            .and_then(|window| now.checked_add_signed(window))
            .ok_or_else(|| PresaleError::InvalidConfiguration {
                message: format!(
                    "withdrawal window of {} days is out of range",
                    config.withdrawal_window_days
                ),
            })?;
        self.signature = Some(Signature {
            image: signature_image.to_string(),
            signed_at: now,
        });
        self.withdrawal_deadline = Some(deadline);
        self.updated_at = now;

        events.emit(Event::ContractSigned {
            contract_id: self.id,
            withdrawal_deadline: deadline,
            timestamp: now,
        });
        info!(contract_id = self.id, %deadline, "contract signed");
        Ok(())
    }

    fn ensure_signed(&self) -> Result<()> {
        if self.signature.is_some() {
            Ok(())
        } else {
            Err(PresaleError::NotReadyForPayment {
                contract_id: self.id,
                status: self.status,
                signed: false,
            })
        }
    }

    /// pending_signature -> active once the down payment has been taken
    pub fn activate(
        &mut self,
        settlement: SettlementRecord,
        now: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Result<()> {
        self.ensure_status(&[ContractStatus::PendingSignature], ContractStatus::Active)?;
        self.ensure_signed()?;
        self.transition(ContractStatus::Active, None, None, now, events)?;
        self.settlement = Some(settlement);
        Ok(())
    }

    /// pending_signature -> pending_payment, down payment to arrive outside the wallet
    pub fn await_external_payment(
        &mut self,
        reviewed_by: &str,
        now: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Result<()> {
        self.ensure_status(&[ContractStatus::PendingSignature], ContractStatus::PendingPayment)?;
        self.ensure_signed()?;
        self.transition(
            ContractStatus::PendingPayment,
            Some("down payment expected outside the wallet".to_string()),
            Some(reviewed_by.to_string()),
            now,
            events,
        )
    }

    /// pending_payment -> active on admin confirmation
    pub fn confirm_external_payment(
        &mut self,
        settlement: SettlementRecord,
        reviewed_by: &str,
        now: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Result<()> {
        self.ensure_status(&[ContractStatus::PendingPayment], ContractStatus::Active)?;
        self.transition(
            ContractStatus::Active,
            Some("external down payment confirmed".to_string()),
            Some(reviewed_by.to_string()),
            now,
            events,
        )?;
        self.settlement = Some(settlement);
        Ok(())
    }

    /// active -> completed
    pub fn complete(
        &mut self,
        reviewed_by: &str,
        now: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Result<()> {
        self.ensure_status(&[ContractStatus::Active], ContractStatus::Completed)?;
        self.transition(
            ContractStatus::Completed,
            None,
            Some(reviewed_by.to_string()),
            now,
            events,
        )
    }

    /// active -> converted (superseded by the notarial contract)
    pub fn convert(
        &mut self,
        reviewed_by: &str,
        now: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Result<()> {
        self.ensure_status(&[ContractStatus::Active], ContractStatus::Converted)?;
        self.transition(
            ContractStatus::Converted,
            None,
            Some(reviewed_by.to_string()),
            now,
            events,
        )
    }

    /// active | pending_payment -> cancelled; refunds are a separate action
    pub fn cancel(
        &mut self,
        reason: &str,
        reviewed_by: &str,
        now: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Result<()> {
        self.ensure_status(
            &[ContractStatus::Active, ContractStatus::PendingPayment],
            ContractStatus::Cancelled,
        )?;
        if reason.trim().is_empty() {
            return Err(PresaleError::validation("a cancellation reason is required"));
        }
        self.transition(
            ContractStatus::Cancelled,
            Some(reason.to_string()),
            Some(reviewed_by.to_string()),
            now,
            events,
        )
    }

    /// status and window checks for a cooling-off withdrawal
    pub fn check_withdrawal(&self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        self.ensure_status(&[ContractStatus::Active], ContractStatus::Withdrawal)?;
        let deadline = self.withdrawal_deadline.ok_or_else(|| {
            PresaleError::validation(format!("contract {} has no withdrawal window", self.id))
        })?;
        if now > deadline {
            return Err(PresaleError::WithdrawalWindowClosed {
                deadline,
                current_time: now,
            });
        }
        if reason.trim().is_empty() {
            return Err(PresaleError::validation("a withdrawal reason is required"));
        }
        Ok(())
    }

    /// active -> withdrawal, recording the refund already credited
    pub fn withdraw(
        &mut self,
        reason: &str,
        refund: RefundRecord,
        now: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Result<()> {
        self.check_withdrawal(reason, now)?;
        self.transition(
            ContractStatus::Withdrawal,
            Some(reason.to_string()),
            refund.reviewed_by.clone(),
            now,
            events,
        )?;

        events.emit(Event::ContractWithdrawn {
            contract_id: self.id,
            refund_amount: refund.amount,
            reason: reason.to_string(),
            timestamp: now,
        });
        self.withdrawal_reason = Some(reason.to_string());
        self.withdrawal_requested_at = Some(now);
        self.withdrawal_refund = Some(refund);
        Ok(())
    }

    /// attach the explicit refund of a cancelled contract
    pub fn record_cancellation_refund(
        &mut self,
        refund: RefundRecord,
        now: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Result<()> {
        if self.status != ContractStatus::Cancelled {
            return Err(self.invalid_transition(ContractStatus::Cancelled));
        }
        if self.cancellation_refund.is_some() {
            return Err(PresaleError::already_processed(format!(
                "contract {} was already refunded",
                self.id
            )));
        }
        events.emit(Event::CancelledContractRefunded {
            contract_id: self.id,
            refund_amount: refund.amount,
            reviewed_by: refund.reviewed_by.clone().unwrap_or_default(),
            timestamp: now,
        });
        self.updated_at = now;
        self.cancellation_refund = Some(refund);
        Ok(())
    }

    /// manual move to any status outside the normal flow; never leaves a
    /// terminal status and has no financial side effects
    pub fn admin_override(
        &mut self,
        to: ContractStatus,
        reason: Option<String>,
        reviewed_by: &str,
        now: DateTime<Utc>,
        events: &mut EventStore,
    ) -> Result<()> {
        if self.status.is_terminal() || self.status == to {
            return Err(self.invalid_transition(to));
        }
        if reviewed_by.trim().is_empty() {
            return Err(PresaleError::validation("reviewed_by is required for admin actions"));
        }
        self.transition(to, reason, Some(reviewed_by.to_string()), now, events)
    }
}
