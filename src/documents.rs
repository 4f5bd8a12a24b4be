//! Contract PDF generation queue.
//!
//! Jobs are enqueued after a contract turns `active` and processed later by
//! the coordinator, never while a contract or wallet lock is held. A failed
//! job is retried with linear backoff until `max_attempts`, then parked in
//! the failed list for admins.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::DocumentConfig;
use crate::errors::Result;
use crate::types::ContractId;
use crate::views::ContractView;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub url: String,
}

/// external PDF rendering service
pub trait PdfGenerator: Send + Sync {
    /// render the contract; failures should be `ExternalServiceFailure`
    fn generate(&self, contract: &ContractView) -> Result<GeneratedDocument>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentJob {
    pub contract_id: ContractId,
    /// attempts made so far
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// totals from one `process_documents` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRunSummary {
    pub generated: usize,
    pub retrying: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct DocumentQueue {
    config: DocumentConfig,
    pending: Mutex<Vec<DocumentJob>>,
    failed: Mutex<Vec<DocumentJob>>,
}

impl DocumentQueue {
    pub fn new(config: DocumentConfig) -> Self {
        Self {
            config,
            pending: Mutex::new(Vec::new()),
            failed: Mutex::new(Vec::new()),
        }
    }

    /// queue a job; returns false if one is already pending for the contract
    pub fn enqueue(&self, contract_id: ContractId, now: DateTime<Utc>) -> bool {
        let mut pending = self.pending.lock();
        if pending.iter().any(|job| job.contract_id == contract_id) {
            return false;
        }
        pending.push(DocumentJob {
            contract_id,
            attempts: 0,
            enqueued_at: now,
            next_attempt_at: now,
            last_error: None,
        });
        true
    }

    /// remove and return the jobs due at `now`
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<DocumentJob> {
        let mut pending = self.pending.lock();
        let (due, waiting): (Vec<_>, Vec<_>) = pending
            .drain(..)
            .partition(|job| job.next_attempt_at <= now);
        *pending = waiting;
        due
    }

    /// count a failed attempt; returns whether the job will be retried
    pub fn record_failure(&self, mut job: DocumentJob, error: String, now: DateTime<Utc>) -> bool {
        job.attempts += 1;
        job.last_error = Some(error);

        let next_attempt_at = self
            .config
            .retry_backoff_minutes
            .checked_mul(i64::from(job.attempts))
            .and_then(Duration::try_minutes)
            .and_then(|backoff| now.checked_add_signed(backoff));

        match next_attempt_at {
            Some(at) if job.attempts < self.config.max_attempts => {
                job.next_attempt_at = at;
                self.pending.lock().push(job);
                true
            }
            // out of attempts, or the backoff no longer fits in a timestamp
            _ => {
                self.failed.lock().push(job);
                false
            }
        }
    }

    /// put an exhausted job back with a fresh attempt budget
    pub fn requeue_failed(&self, contract_id: ContractId, now: DateTime<Utc>) -> bool {
        let job = {
            let mut failed = self.failed.lock();
            match failed.iter().position(|job| job.contract_id == contract_id) {
                Some(idx) => failed.remove(idx),
                None => return false,
            }
        };
        self.pending.lock().push(DocumentJob {
            attempts: 0,
            next_attempt_at: now,
            ..job
        });
        true
    }

    pub fn pending(&self) -> Vec<DocumentJob> {
        self.pending.lock().clone()
    }

    pub fn failed(&self) -> Vec<DocumentJob> {
        self.failed.lock().clone()
    }
}
