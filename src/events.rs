use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{
    ContractId, ContractStatus, DepositMethod, DepositRequestId, DepositStatus, TransactionId,
    WalletId, WalletStatus,
};

/// audit events emitted by the contract book, ledger and coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // contract events
    ContractCreated {
        contract_id: ContractId,
        contract_number: String,
        purchase_price: Money,
        down_payment_amount: Money,
        timestamp: DateTime<Utc>,
    },
    ContractTermsUpdated {
        contract_id: ContractId,
        down_payment_amount: Money,
        remaining_amount: Money,
        timestamp: DateTime<Utc>,
    },
    ContractSigned {
        contract_id: ContractId,
        withdrawal_deadline: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    ContractStatusChanged {
        contract_id: ContractId,
        old_status: ContractStatus,
        new_status: ContractStatus,
        reason: Option<String>,
        reviewed_by: Option<String>,
        timestamp: DateTime<Utc>,
    },
    DownPaymentSettled {
        contract_id: ContractId,
        wallet_id: WalletId,
        amount: Money,
        bonus_used: Money,
        cash_used: Money,
        timestamp: DateTime<Utc>,
    },
    SettlementCompensated {
        contract_id: ContractId,
        wallet_id: WalletId,
        amount: Money,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    ContractWithdrawn {
        contract_id: ContractId,
        refund_amount: Money,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    CancelledContractRefunded {
        contract_id: ContractId,
        refund_amount: Money,
        reviewed_by: String,
        timestamp: DateTime<Utc>,
    },
    ContractDocumentGenerated {
        contract_id: ContractId,
        url: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
    ContractDocumentFailed {
        contract_id: ContractId,
        attempts: u32,
        error: String,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },

    // wallet events
    DepositRequested {
        request_id: DepositRequestId,
        wallet_id: WalletId,
        amount: Money,
        method: DepositMethod,
        timestamp: DateTime<Utc>,
    },
    DepositStatusChanged {
        request_id: DepositRequestId,
        old_status: DepositStatus,
        new_status: DepositStatus,
        timestamp: DateTime<Utc>,
    },
    DepositApproved {
        request_id: DepositRequestId,
        wallet_id: WalletId,
        transaction_id: TransactionId,
        amount: Money,
        reviewed_by: String,
        timestamp: DateTime<Utc>,
    },
    DepositRejected {
        request_id: DepositRequestId,
        wallet_id: WalletId,
        reason: String,
        reviewed_by: String,
        timestamp: DateTime<Utc>,
    },
    WalletQualified {
        wallet_id: WalletId,
        timestamp: DateTime<Utc>,
    },
    WalletStatusChanged {
        wallet_id: WalletId,
        old_status: WalletStatus,
        new_status: WalletStatus,
        reviewed_by: String,
        timestamp: DateTime<Utc>,
    },
    CashWithdrawn {
        wallet_id: WalletId,
        transaction_id: TransactionId,
        amount: Money,
        reviewed_by: String,
        timestamp: DateTime<Utc>,
    },
    RefundIssued {
        wallet_id: WalletId,
        transaction_id: TransactionId,
        amount: Money,
        original_transaction: Option<TransactionId>,
        timestamp: DateTime<Utc>,
    },
    InterestCredited {
        wallet_id: WalletId,
        amount: Money,
        days: u32,
        period_end: DateTime<Utc>,
    },
}

/// event store for collecting events during a single operation
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// shared audit log, safe to append from concurrent handlers
#[derive(Debug, Default)]
pub struct EventLog {
    inner: Mutex<EventStore>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: Event) {
        self.inner.lock().emit(event);
    }

    /// append everything collected by an operation-local store
    pub fn extend(&self, store: &mut EventStore) {
        let events = store.take_events();
        if events.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        for event in events {
            inner.emit(event);
        }
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.inner.lock().events().to_vec()
    }

    pub fn take_events(&self) -> Vec<Event> {
        self.inner.lock().take_events()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_log_collects_operation_events() {
        let log = EventLog::new();
        let mut store = EventStore::new();
        let wallet_id = Uuid::new_v4();

        store.emit(Event::WalletQualified {
            wallet_id,
            timestamp: Utc::now(),
        });
        log.extend(&mut store);

        assert!(store.events().is_empty());
        assert_eq!(log.len(), 1);

        let taken = log.take_events();
        assert_eq!(taken.len(), 1);
        assert!(log.is_empty());
    }
}
