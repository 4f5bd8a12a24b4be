//! Daily interest accrual for qualifying wallets.
//!
//! Interest is simple (non-compounding) on the cash balance and is credited to
//! the purchase-only bonus balance. Each credit produces one
//! [`InterestAccrualRecord`] and one `interest_credit` wallet transaction.

pub mod accrual;

use chrono::{DateTime, Duration, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::InterestConfig;
use crate::decimal::{Money, Rate};
use crate::types::{WalletId, WalletStatus};
use crate::wallet::{Wallet, WalletLedger};

pub use accrual::{AccrualCalculator, DayCountConvention};

/// one credited interest period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestAccrualRecord {
    pub wallet_id: WalletId,
    pub principal_amount: Money,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub days_in_period: u32,
    pub annual_rate: Rate,
    pub interest_amount: Money,
    pub credited_at: DateTime<Utc>,
}

/// what the engine decided for one wallet
#[derive(Debug, Clone, PartialEq)]
pub enum AccrualDecision {
    /// nothing to do
    Skip(SkipReason),
    /// move the period forward without a credit (nothing to accrue on)
    Advance { period_end: DateTime<Utc> },
    /// credit interest for the period
    Credit(AccrualPlan),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotQualified,
    NoOpenPeriod,
    ZeroDayPeriod,
    /// interest below one cent so far; keep accumulating days
    BelowOneCent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccrualPlan {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub days: u32,
    pub principal: Money,
    pub interest: Money,
}

/// result of one accrual run over the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct AccrualRun {
    pub run_at: DateTime<Utc>,
    pub credited: Vec<InterestAccrualRecord>,
    pub skipped: usize,
}

impl AccrualRun {
    pub fn total_interest(&self) -> Money {
        self.credited.iter().map(|r| r.interest_amount).sum()
    }
}

/// engine for accruing wallet interest
#[derive(Debug, Clone)]
pub struct InterestAccrualEngine {
    annual_rate: Rate,
    calculator: AccrualCalculator,
}

impl InterestAccrualEngine {
    pub fn new(config: &InterestConfig) -> Self {
        Self {
            annual_rate: config.annual_rate,
            calculator: AccrualCalculator::new(config.day_count_convention),
        }
    }

    pub fn annual_rate(&self) -> Rate {
        self.annual_rate
    }

    /// decide the accrual for a wallet as of `now` without touching it
    pub fn plan(&self, wallet: &Wallet, now: DateTime<Utc>) -> AccrualDecision {
        if !wallet.qualifies_for_interest {
            return AccrualDecision::Skip(SkipReason::NotQualified);
        }
        let Some(start) = wallet.interest_period_start else {
            return AccrualDecision::Skip(SkipReason::NoOpenPeriod);
        };

        // suspended wallets accrue only up to the suspension
        let end = match wallet.status {
            WalletStatus::Active => now,
            WalletStatus::Frozen | WalletStatus::Closed => match wallet.suspended_at {
                Some(at) => at.min(now),
                None => return AccrualDecision::Skip(SkipReason::NoOpenPeriod),
            },
        };

        let days = self.calculator.calculate_days(start, end);
        if days == 0 {
            return AccrualDecision::Skip(SkipReason::ZeroDayPeriod);
        }
        let period_end = start + Duration::days(days as i64);

        let principal = wallet.interest_principal.min(wallet.balance);
        if !principal.is_positive() {
            return AccrualDecision::Advance { period_end };
        }

        let interest = self
            .calculator
            .simple_interest(principal, self.annual_rate, days, period_end);
        if !interest.is_positive() {
            return AccrualDecision::Skip(SkipReason::BelowOneCent);
        }

        AccrualDecision::Credit(AccrualPlan {
            period_start: start,
            period_end,
            days,
            principal,
            interest,
        })
    }

    /// accrue every wallet in the ledger; wallets are locked one at a time
    pub fn run(&self, ledger: &WalletLedger, time_provider: &SafeTimeProvider) -> AccrualRun {
        let now = time_provider.now();
        let mut credited = Vec::new();
        let mut skipped = 0;

        for wallet_id in ledger.wallet_ids() {
            match ledger.apply_accrual(wallet_id, self, now) {
                Ok(Some(record)) => credited.push(record),
                Ok(None) => skipped += 1,
                Err(e) => {
                    debug!(wallet_id = %wallet_id, error = %e, "accrual skipped");
                    skipped += 1;
                }
            }
        }

        let run = AccrualRun {
            run_at: now,
            credited,
            skipped,
        };
        info!(
            credited = run.credited.len(),
            skipped = run.skipped,
            total = %run.total_interest(),
            "interest accrual run finished"
        );
        run
    }
}
