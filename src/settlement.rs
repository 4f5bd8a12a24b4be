//! Settlement coordinator.
//!
//! Pairs wallet movements with contract transitions. Every financial
//! operation runs under the contract lock (contract before wallet), and a
//! debit whose contract transition fails is refunded before the error is
//! returned. PDF jobs are only queued after the contract lock is released.

use std::sync::Arc;

use hourglass_rs::SafeTimeProvider;
use tracing::{error, info, warn};

use crate::catalog::{PropertyCatalog, PropertySnapshot};
use crate::config::EngineConfig;
use crate::contract::{
    BuyerDetails, Contract, ContractApplication, ContractBook, RefundRecord, SettlementRecord,
    SettlementSource, TermsRequest,
};
use crate::documents::{DocumentJob, DocumentQueue, DocumentRunSummary, PdfGenerator};
use crate::errors::{PresaleError, Result};
use crate::events::{Event, EventLog};
use crate::interest::{AccrualRun, InterestAccrualEngine};
use crate::types::{ContractId, ContractStatus, UserId, WalletId};
use crate::views::{ContractView, WalletView};
use crate::wallet::{PurchaseDebit, WalletLedger};

/// front door for contract, wallet and interest operations
pub struct SettlementCoordinator {
    config: EngineConfig,
    catalog: Arc<dyn PropertyCatalog>,
    contracts: ContractBook,
    ledger: WalletLedger,
    interest: InterestAccrualEngine,
    documents: DocumentQueue,
    pdf: Arc<dyn PdfGenerator>,
    events: Arc<EventLog>,
}

impl SettlementCoordinator {
    pub fn new(
        config: EngineConfig,
        catalog: Arc<dyn PropertyCatalog>,
        pdf: Arc<dyn PdfGenerator>,
    ) -> Result<Self> {
        config.validate()?;
        let events = Arc::new(EventLog::new());

        Ok(Self {
            contracts: ContractBook::with_event_log(config.contracts.clone(), Arc::clone(&events)),
            ledger: WalletLedger::with_event_log(config.interest.clone(), Arc::clone(&events)),
            interest: InterestAccrualEngine::new(&config.interest),
            documents: DocumentQueue::new(config.documents.clone()),
            config,
            catalog,
            pdf,
            events,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn contracts(&self) -> &ContractBook {
        &self.contracts
    }

    pub fn ledger(&self) -> &WalletLedger {
        &self.ledger
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    // ---- contract authoring ----

    /// open a draft contract, snapshotting the property as it is now
    pub fn create_contract(
        &self,
        application: &ContractApplication,
        time_provider: &SafeTimeProvider,
    ) -> Result<Contract> {
        let now = time_provider.now();
        let listing = self.catalog.property(application.property_id)?;
        let developer = match application.developer_id.or(listing.developer_id) {
            Some(id) => Some(self.catalog.developer(id)?),
            None => None,
        };
        let snapshot = PropertySnapshot::capture(&listing, now);
        self.contracts.open(application, snapshot, developer, now)
    }

    pub fn update_draft_terms(
        &self,
        contract_id: ContractId,
        request: &TermsRequest,
        time_provider: &SafeTimeProvider,
    ) -> Result<Contract> {
        let now = time_provider.now();
        let config = &self.config.contracts;
        self.contracts.update(contract_id, |contract, events| {
            contract.update_draft_terms(request, config, now, events)?;
            Ok(contract.clone())
        })
    }

    pub fn update_buyer_details(
        &self,
        contract_id: ContractId,
        buyer: BuyerDetails,
        time_provider: &SafeTimeProvider,
    ) -> Result<Contract> {
        let now = time_provider.now();
        self.contracts.update(contract_id, |contract, _| {
            contract.update_buyer_details(buyer, now)?;
            Ok(contract.clone())
        })
    }

    pub fn request_signature(
        &self,
        contract_id: ContractId,
        time_provider: &SafeTimeProvider,
    ) -> Result<Contract> {
        let now = time_provider.now();
        self.contracts.update(contract_id, |contract, events| {
            contract.request_signature(now, events)?;
            Ok(contract.clone())
        })
    }

    pub fn sign_contract(
        &self,
        contract_id: ContractId,
        signature_image: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Contract> {
        let now = time_provider.now();
        let config = &self.config.contracts;
        self.contracts.update(contract_id, |contract, events| {
            contract.sign(signature_image, config, now, events)?;
            Ok(contract.clone())
        })
    }

    // ---- settlement ----

    /// debit the buyer's wallet for the down payment and activate the contract
    ///
    /// Calling this again after success returns the stored receipt without a
    /// second debit.
    pub fn pay_down_payment(
        &self,
        contract_id: ContractId,
        time_provider: &SafeTimeProvider,
    ) -> Result<SettlementRecord> {
        let buyer_id = self.contracts.get(contract_id)?.buyer_id;
        let wallet_id = self.ledger.wallet_for_user(buyer_id, time_provider);

        let (record, newly_settled) = self.contracts.update(contract_id, |contract, events| {
            if let Some(existing) = &contract.settlement {
                if contract.status == ContractStatus::Active {
                    return Ok((existing.clone(), false));
                }
                return Err(PresaleError::already_processed(format!(
                    "down payment of contract {} was settled and the contract is now {}",
                    contract.id, contract.status
                )));
            }
            if contract.status != ContractStatus::PendingSignature || !contract.is_signed() {
                return Err(PresaleError::NotReadyForPayment {
                    contract_id: contract.id,
                    status: contract.status,
                    signed: contract.is_signed(),
                });
            }

            let now = time_provider.now();
            let amount = contract.terms.down_payment_amount;
            let debit =
                self.ledger
                    .debit_for_purchase(wallet_id, amount, Some(contract.id), time_provider)?;

            let record = SettlementRecord {
                contract_id: contract.id,
                amount,
                source: SettlementSource::Wallet {
                    wallet_id,
                    bonus_used: debit.bonus_used,
                    cash_used: debit.cash_used,
                    transaction_ids: debit.transaction_ids.clone(),
                },
                settled_at: now,
            };

            if let Err(err) = contract.activate(record.clone(), now, events) {
                self.compensate(contract.id, &debit, &err, time_provider)?;
                return Err(err);
            }

            events.emit(Event::DownPaymentSettled {
                contract_id: contract.id,
                wallet_id,
                amount,
                bonus_used: debit.bonus_used,
                cash_used: debit.cash_used,
                timestamp: now,
            });
            Ok((record, true))
        })?;

        if newly_settled {
            self.documents.enqueue(contract_id, time_provider.now());
            info!(
                contract_id,
                wallet_id = %wallet_id,
                amount = %record.amount,
                "down payment settled"
            );
        }
        Ok(record)
    }

    /// put a debit back after the contract refused the transition
    fn compensate(
        &self,
        contract_id: ContractId,
        debit: &PurchaseDebit,
        cause: &PresaleError,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        warn!(contract_id, error = %cause, "activation failed after debit, refunding");
        self.ledger
            .refund(
                debit.wallet_id,
                debit.amount,
                debit.primary_transaction(),
                Some(contract_id),
                time_provider,
            )
            .map_err(|refund_err| {
                error!(contract_id, error = %refund_err, "compensating refund failed");
                refund_err
            })?;

        self.events.emit(Event::SettlementCompensated {
            contract_id,
            wallet_id: debit.wallet_id,
            amount: debit.amount,
            reason: cause.to_string(),
            timestamp: time_provider.now(),
        });
        Ok(())
    }

    /// signed contract whose down payment will arrive outside the wallet
    pub fn await_external_payment(
        &self,
        contract_id: ContractId,
        reviewed_by: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Contract> {
        ensure_reviewer(reviewed_by)?;
        let now = time_provider.now();
        self.contracts.update(contract_id, |contract, events| {
            contract.await_external_payment(reviewed_by, now, events)?;
            Ok(contract.clone())
        })
    }

    /// admin confirms the external down payment; no wallet movement
    pub fn confirm_external_payment(
        &self,
        contract_id: ContractId,
        reference: Option<String>,
        reviewed_by: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<SettlementRecord> {
        ensure_reviewer(reviewed_by)?;
        let now = time_provider.now();
        let record = self.contracts.update(contract_id, |contract, events| {
            let record = SettlementRecord {
                contract_id: contract.id,
                amount: contract.terms.down_payment_amount,
                source: SettlementSource::External {
                    confirmed_by: reviewed_by.to_string(),
                    reference,
                },
                settled_at: now,
            };
            contract.confirm_external_payment(record.clone(), reviewed_by, now, events)?;
            Ok(record)
        })?;

        self.documents.enqueue(contract_id, now);
        info!(contract_id, amount = %record.amount, reviewed_by, "external down payment confirmed");
        Ok(record)
    }

    /// cooling-off withdrawal: refund the down payment and close the contract
    ///
    /// A repeated call returns the stored refund.
    pub fn withdraw_contract(
        &self,
        contract_id: ContractId,
        reason: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<RefundRecord> {
        let now = time_provider.now();
        let (refund, newly_withdrawn) = self.contracts.update(contract_id, |contract, events| {
            if contract.status == ContractStatus::Withdrawal {
                if let Some(existing) = &contract.withdrawal_refund {
                    return Ok((existing.clone(), false));
                }
            }
            contract.check_withdrawal(reason, now)?;
            contract.recompute_and_verify()?;
            let settlement = settled(contract)?;

            let refund = self.refund_settlement(contract, &settlement, reason, None, time_provider)?;
            contract.withdraw(reason, refund.clone(), now, events)?;
            Ok((refund, true))
        })?;

        if newly_withdrawn {
            info!(contract_id, amount = %refund.amount, reason, "contract withdrawn");
        }
        Ok(refund)
    }

    /// explicit admin refund of a cancelled contract's down payment
    pub fn refund_cancelled(
        &self,
        contract_id: ContractId,
        reviewed_by: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<RefundRecord> {
        ensure_reviewer(reviewed_by)?;
        let now = time_provider.now();
        let refund = self.contracts.update(contract_id, |contract, events| {
            if contract.status != ContractStatus::Cancelled {
                return Err(PresaleError::validation(format!(
                    "contract {} is {}, only cancelled contracts can be refunded",
                    contract.id, contract.status
                )));
            }
            if contract.cancellation_refund.is_some() {
                return Err(PresaleError::already_processed(format!(
                    "contract {} was already refunded",
                    contract.id
                )));
            }
            let settlement = settled(contract)?;

            let refund = self.refund_settlement(
                contract,
                &settlement,
                "cancelled contract refund",
                Some(reviewed_by),
                time_provider,
            )?;
            contract.record_cancellation_refund(refund.clone(), now, events)?;
            Ok(refund)
        })?;

        info!(contract_id, amount = %refund.amount, reviewed_by, "cancelled contract refunded");
        Ok(refund)
    }

    fn refund_settlement(
        &self,
        contract: &Contract,
        settlement: &SettlementRecord,
        reason: &str,
        reviewed_by: Option<&str>,
        time_provider: &SafeTimeProvider,
    ) -> Result<RefundRecord> {
        // externally paid contracts are refunded into the buyer's wallet too
        let wallet_id = match &settlement.source {
            SettlementSource::Wallet { wallet_id, .. } => *wallet_id,
            SettlementSource::External { .. } => {
                self.ledger.wallet_for_user(contract.buyer_id, time_provider)
            }
        };
        let tx = self.ledger.refund(
            wallet_id,
            settlement.amount,
            settlement.wallet_transaction(),
            Some(contract.id),
            time_provider,
        )?;

        Ok(RefundRecord {
            contract_id: contract.id,
            wallet_id,
            transaction_id: tx.id,
            amount: tx.amount,
            reason: reason.to_string(),
            reviewed_by: reviewed_by.map(str::to_string),
            refunded_at: tx.created_at,
        })
    }

    // ---- admin transitions ----

    pub fn complete_contract(
        &self,
        contract_id: ContractId,
        reviewed_by: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Contract> {
        ensure_reviewer(reviewed_by)?;
        let now = time_provider.now();
        self.contracts.update(contract_id, |contract, events| {
            contract.complete(reviewed_by, now, events)?;
            Ok(contract.clone())
        })
    }

    pub fn convert_contract(
        &self,
        contract_id: ContractId,
        reviewed_by: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Contract> {
        ensure_reviewer(reviewed_by)?;
        let now = time_provider.now();
        self.contracts.update(contract_id, |contract, events| {
            contract.convert(reviewed_by, now, events)?;
            Ok(contract.clone())
        })
    }

    /// cancel without refunding; see [`Self::refund_cancelled`]
    pub fn cancel_contract(
        &self,
        contract_id: ContractId,
        reason: &str,
        reviewed_by: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Contract> {
        ensure_reviewer(reviewed_by)?;
        let now = time_provider.now();
        let contract = self.contracts.update(contract_id, |contract, events| {
            contract.cancel(reason, reviewed_by, now, events)?;
            Ok(contract.clone())
        })?;
        info!(contract_id, reason, reviewed_by, "contract cancelled");
        Ok(contract)
    }

    /// direct status change outside the normal flow; moves no money
    pub fn override_status(
        &self,
        contract_id: ContractId,
        to: ContractStatus,
        reason: Option<String>,
        reviewed_by: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<Contract> {
        let now = time_provider.now();
        let contract = self.contracts.update(contract_id, |contract, events| {
            contract.admin_override(to, reason, reviewed_by, now, events)?;
            Ok(contract.clone())
        })?;

        if to == ContractStatus::Active {
            self.documents.enqueue(contract_id, now);
        }
        warn!(contract_id, %to, reviewed_by, "contract status overridden");
        Ok(contract)
    }

    // ---- reads ----

    pub fn contract_view(
        &self,
        contract_id: ContractId,
        time_provider: &SafeTimeProvider,
    ) -> Result<ContractView> {
        let contract = self.contracts.get(contract_id)?;
        Ok(ContractView::from_contract(&contract, time_provider.now()))
    }

    pub fn wallet_for_user(&self, user_id: UserId, time_provider: &SafeTimeProvider) -> WalletId {
        self.ledger.wallet_for_user(user_id, time_provider)
    }

    pub fn wallet_view(&self, wallet_id: WalletId, recent: usize) -> Result<WalletView> {
        let wallet = self.ledger.wallet(wallet_id)?;
        let transactions = self.ledger.transactions(wallet_id)?;
        Ok(WalletView::from_wallet(&wallet, &transactions, recent))
    }

    // ---- background work ----

    /// one interest accrual pass over every wallet
    pub fn run_interest_accrual(&self, time_provider: &SafeTimeProvider) -> AccrualRun {
        self.interest.run(&self.ledger, time_provider)
    }

    /// generate due contract PDFs; failures are logged and retried, never returned
    pub fn process_documents(&self, time_provider: &SafeTimeProvider) -> DocumentRunSummary {
        let now = time_provider.now();
        let mut summary = DocumentRunSummary::default();

        for job in self.documents.take_due(now) {
            let contract_id = job.contract_id;
            let view = match self.contracts.get(contract_id) {
                Ok(contract) => ContractView::from_contract(&contract, now),
                Err(err) => {
                    warn!(contract_id, error = %err, "dropping document job");
                    continue;
                }
            };

            match self.pdf.generate(&view) {
                Ok(document) => {
                    let attempts = job.attempts + 1;
                    let stored = self.contracts.update(contract_id, |contract, events| {
                        contract.contract_pdf_url = Some(document.url.clone());
                        events.emit(Event::ContractDocumentGenerated {
                            contract_id,
                            url: document.url.clone(),
                            attempts,
                            timestamp: now,
                        });
                        Ok(())
                    });
                    match stored {
                        Ok(()) => {
                            summary.generated += 1;
                            info!(contract_id, url = %document.url, attempts, "contract document generated");
                        }
                        Err(err) => self.document_failed(job, &err, now, &mut summary),
                    }
                }
                Err(err) => self.document_failed(job, &err, now, &mut summary),
            }
        }
        summary
    }

    fn document_failed(
        &self,
        job: DocumentJob,
        err: &PresaleError,
        now: chrono::DateTime<chrono::Utc>,
        summary: &mut DocumentRunSummary,
    ) {
        let contract_id = job.contract_id;
        let attempts = job.attempts + 1;
        let will_retry = self.documents.record_failure(job, err.to_string(), now);

        self.events.emit(Event::ContractDocumentFailed {
            contract_id,
            attempts,
            error: err.to_string(),
            will_retry,
            timestamp: now,
        });
        warn!(contract_id, attempts, will_retry, error = %err, "contract document generation failed");

        if will_retry {
            summary.retrying += 1;
        } else {
            summary.failed += 1;
        }
    }

    /// document jobs that exhausted their retries
    pub fn failed_documents(&self) -> Vec<DocumentJob> {
        self.documents.failed()
    }

    pub fn pending_documents(&self) -> Vec<DocumentJob> {
        self.documents.pending()
    }

    /// give a parked document job a fresh set of attempts
    pub fn retry_document(
        &self,
        contract_id: ContractId,
        reviewed_by: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<bool> {
        ensure_reviewer(reviewed_by)?;
        let requeued = self.documents.requeue_failed(contract_id, time_provider.now());
        if requeued {
            info!(contract_id, reviewed_by, "document job requeued");
        }
        Ok(requeued)
    }
}

fn settled(contract: &Contract) -> Result<SettlementRecord> {
    contract.settlement.clone().ok_or_else(|| {
        PresaleError::validation(format!(
            "contract {} has no settled down payment to refund",
            contract.id
        ))
    })
}

fn ensure_reviewer(reviewed_by: &str) -> Result<()> {
    if reviewed_by.trim().is_empty() {
        Err(PresaleError::validation("reviewed_by is required for admin actions"))
    } else {
        Ok(())
    }
}
