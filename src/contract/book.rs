use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;

use super::{Contract, ContractApplication, ContractTerms};
use crate::catalog::{Developer, PropertySnapshot};
use crate::config::ContractConfig;
use crate::errors::{PresaleError, Result};
use crate::events::{Event, EventLog, EventStore};
use crate::types::{ContractId, ContractStatus, UserId};

/// contract store with per-contract mutual exclusion
pub struct ContractBook {
    config: ContractConfig,
    contracts: DashMap<ContractId, Arc<Mutex<Contract>>>,
    next_id: AtomicU64,
    events: Arc<EventLog>,
}

impl ContractBook {
    pub fn new(config: ContractConfig) -> Self {
        Self::with_event_log(config, Arc::new(EventLog::new()))
    }

    pub fn with_event_log(config: ContractConfig, events: Arc<EventLog>) -> Self {
        Self {
            config,
            contracts: DashMap::new(),
            next_id: AtomicU64::new(0),
            events,
        }
    }

    pub fn config(&self) -> &ContractConfig {
        &self.config
    }

    /// open a new contract in draft from a validated application
    pub fn open(
        &self,
        application: &ContractApplication,
        property: PropertySnapshot,
        developer: Option<Developer>,
        now: DateTime<Utc>,
    ) -> Result<Contract> {
        application.buyer.validate()?;
        let terms = ContractTerms::compute(&property, &application.terms, &self.config)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let contract_number = format!(
            "{}-{}-{:06}",
            self.config.contract_number_prefix,
            now.year(),
            id
        );
        if let Some(quote) = &application.quote {
            terms.compare_quote(&contract_number, quote);
        }

        let contract = Contract {
            id,
            contract_number,
            buyer_id: application.buyer_id,
            buyer: application.buyer.clone(),
            property,
            developer,
            terms,
            status: ContractStatus::Draft,
            signature: None,
            withdrawal_deadline: None,
            withdrawal_reason: None,
            withdrawal_requested_at: None,
            settlement: None,
            withdrawal_refund: None,
            cancellation_refund: None,
            contract_pdf_url: None,
            status_history: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        self.contracts
            .insert(id, Arc::new(Mutex::new(contract.clone())));
        self.events.emit(Event::ContractCreated {
            contract_id: id,
            contract_number: contract.contract_number.clone(),
            purchase_price: contract.terms.purchase_price,
            down_payment_amount: contract.terms.down_payment_amount,
            timestamp: now,
        });
        info!(
            contract_id = id,
            contract_number = %contract.contract_number,
            price = %contract.terms.purchase_price,
            "contract created"
        );

        Ok(contract)
    }

    fn handle(&self, id: ContractId) -> Result<Arc<Mutex<Contract>>> {
        self.contracts
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(PresaleError::ContractNotFound { id })
    }

    pub fn get(&self, id: ContractId) -> Result<Contract> {
        Ok(self.handle(id)?.lock().clone())
    }

    /// all contracts ordered by id
    pub fn list(&self) -> Vec<Contract> {
        let handles: Vec<_> = self
            .contracts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut contracts: Vec<Contract> = handles.iter().map(|h| h.lock().clone()).collect();
        contracts.sort_by_key(|c| c.id);
        contracts
    }

    pub fn for_buyer(&self, buyer_id: UserId) -> Vec<Contract> {
        self.list()
            .into_iter()
            .filter(|c| c.buyer_id == buyer_id)
            .collect()
    }

    /// run `f` against a scratch copy under the contract lock; the copy and
    /// its events are committed only if `f` succeeds
    pub(crate) fn update<T>(
        &self,
        id: ContractId,
        f: impl FnOnce(&mut Contract, &mut EventStore) -> Result<T>,
    ) -> Result<T> {
        let handle = self.handle(id)?;
        let mut guard = handle.lock();

        let mut scratch = guard.clone();
        let mut store = EventStore::new();
        let out = f(&mut scratch, &mut store)?;

        *guard = scratch;
        self.events.extend(&mut store);
        Ok(out)
    }
}
