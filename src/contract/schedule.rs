use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{PresaleError, Result};
use crate::types::ContractId;

/// one dated installment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    pub number: u32,
    pub due_date: DateTime<Utc>,
    pub beginning_balance: Money,
    pub principal_portion: Money,
    pub interest_portion: Money,
    pub payment_amount: Money,
    pub ending_balance: Money,
}

/// installment plan for a contract's remaining amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentSchedule {
    pub contract_id: ContractId,
    pub principal: Money,
    pub interest_rate: Rate,
    pub start_date: DateTime<Utc>,
    pub installments: Vec<ScheduledInstallment>,
    pub total_interest: Money,
    pub total_payment: Money,
}

impl InstallmentSchedule {
    /// equal principal shares (last absorbs the remainder) plus interest on the
    /// declining balance when the rate is non-zero
    pub fn generate(
        contract_id: ContractId,
        principal: Money,
        interest_rate: Rate,
        months: u32,
        start_date: DateTime<Utc>,
    ) -> Result<Self> {
        if months == 0 {
            return Err(PresaleError::validation("installment schedule needs at least one month"));
        }

        let monthly_rate = interest_rate.monthly_rate();
        let mut balance = principal;
        let mut installments = Vec::with_capacity(months as usize);

        for (idx, share) in principal.split_even(months).into_iter().enumerate() {
            let number = idx as u32 + 1;
            let due_date = start_date
                .checked_add_months(Months::new(number))
                .ok_or_else(|| PresaleError::validation("installment date out of range"))?;

            let interest_portion = if monthly_rate.is_zero() {
                Money::ZERO
            } else {
                balance * monthly_rate.as_decimal()
            };
            let ending_balance = balance - share;

            installments.push(ScheduledInstallment {
                number,
                due_date,
                beginning_balance: balance,
                principal_portion: share,
                interest_portion,
                payment_amount: share + interest_portion,
                ending_balance,
            });
            balance = ending_balance;
        }

        let total_interest = installments.iter().map(|i| i.interest_portion).sum();
        let total_payment = installments.iter().map(|i| i.payment_amount).sum();

        Ok(Self {
            contract_id,
            principal,
            interest_rate,
            start_date,
            installments,
            total_interest,
            total_payment,
        })
    }

    pub fn get(&self, number: u32) -> Option<&ScheduledInstallment> {
        self.installments.iter().find(|i| i.number == number)
    }

    /// installments falling due on or before `as_of`
    pub fn due_by(&self, as_of: DateTime<Utc>) -> impl Iterator<Item = &ScheduledInstallment> {
        self.installments.iter().filter(move |i| i.due_date <= as_of)
    }
}
