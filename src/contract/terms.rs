use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::PropertySnapshot;
use crate::config::ContractConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{PresaleError, Result};
use crate::types::{ContractId, PaymentPlan};

/// buyer's choice of down payment and plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermsRequest {
    pub down_payment_percent: u8,
    pub payment_plan: PaymentPlan,
    pub installment_months: Option<u32>,
}

impl TermsRequest {
    pub fn full(down_payment_percent: u8) -> Self {
        Self {
            down_payment_percent,
            payment_plan: PaymentPlan::Full,
            installment_months: None,
        }
    }

    pub fn installment(down_payment_percent: u8, months: u32) -> Self {
        Self {
            down_payment_percent,
            payment_plan: PaymentPlan::Installment,
            installment_months: Some(months),
        }
    }
}

/// amounts a client form showed the buyer; never used for money movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientQuote {
    pub down_payment_amount: Money,
    pub remaining_amount: Money,
    pub monthly_installment: Option<Money>,
}

/// the money side of a contract, always derived from the frozen price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractTerms {
    pub purchase_price: Money,
    pub down_payment_percent: u8,
    pub down_payment_amount: Money,
    pub remaining_amount: Money,
    pub payment_plan: PaymentPlan,
    pub installment_months: Option<u32>,
    /// principal share of each installment but the last
    pub monthly_installment: Option<Money>,
    /// installment interest, percent per annum
    pub interest_rate: Rate,
}

impl ContractTerms {
    /// compute all derived amounts server-side
    pub fn compute(
        property: &PropertySnapshot,
        request: &TermsRequest,
        config: &ContractConfig,
    ) -> Result<Self> {
        let price = property.price;
        if !price.is_positive() {
            return Err(PresaleError::validation(format!(
                "purchase price must be positive, got {}",
                price
            )));
        }

        let percent = request.down_payment_percent;
        if percent > 100 {
            return Err(PresaleError::validation(format!(
                "down payment percent must be between 0 and 100, got {}",
                percent
            )));
        }
        if percent < property.min_down_payment_percent {
            return Err(PresaleError::validation(format!(
                "down payment of {}% is below the minimum of {}%",
                percent, property.min_down_payment_percent
            )));
        }

        let down_payment_amount = price.percentage(Decimal::from(percent));
        let remaining_amount = price - down_payment_amount;

        let (installment_months, monthly_installment) = match request.payment_plan {
            PaymentPlan::Full => (None, None),
            PaymentPlan::Installment => {
                let months = request.installment_months.ok_or_else(|| {
                    PresaleError::validation("installment plan requires installment_months")
                })?;
                if months == 0 || months > config.max_installment_months {
                    return Err(PresaleError::validation(format!(
                        "installment months must be between 1 and {}, got {}",
                        config.max_installment_months, months
                    )));
                }
                if !remaining_amount.is_positive() {
                    return Err(PresaleError::validation(
                        "nothing left to pay in installments at a 100% down payment",
                    ));
                }
                let first = remaining_amount
                    .split_even(months)
                    .first()
                    .copied()
                    .unwrap_or(remaining_amount);
                (Some(months), Some(first))
            }
        };

        Ok(Self {
            purchase_price: price,
            down_payment_percent: percent,
            down_payment_amount,
            remaining_amount,
            payment_plan: request.payment_plan,
            installment_months,
            monthly_installment,
            interest_rate: property.installment_interest_rate,
        })
    }

    /// the installment that absorbs the rounding remainder
    pub fn final_installment(&self) -> Option<Money> {
        let months = self.installment_months?;
        self.remaining_amount.split_even(months).last().copied()
    }

    /// recompute from price and percent and compare with what is stored
    pub fn verify(&self, contract_id: ContractId) -> Result<()> {
        let expected_down = self
            .purchase_price
            .percentage(Decimal::from(self.down_payment_percent));
        let expected_remaining = self.purchase_price - expected_down;

        let drift = |field: &str, stored: Money, expected: Money| PresaleError::FinancialDrift {
            contract_id,
            field: field.to_string(),
            stored,
            expected,
        };

        if self.down_payment_amount != expected_down {
            return Err(drift("down_payment_amount", self.down_payment_amount, expected_down));
        }
        if self.remaining_amount != expected_remaining {
            return Err(drift("remaining_amount", self.remaining_amount, expected_remaining));
        }
        if self.down_payment_amount + self.remaining_amount != self.purchase_price {
            return Err(drift(
                "purchase_price",
                self.purchase_price,
                self.down_payment_amount + self.remaining_amount,
            ));
        }
        if let (Some(months), Some(stored)) = (self.installment_months, self.monthly_installment) {
            let expected = expected_remaining
                .split_even(months)
                .first()
                .copied()
                .unwrap_or(expected_remaining);
            if stored != expected {
                return Err(drift("monthly_installment", stored, expected));
            }
        }
        Ok(())
    }

    /// log client-side figures that disagree with ours; they are never used
    pub fn compare_quote(&self, contract_number: &str, quote: &ClientQuote) -> bool {
        let matches = quote.down_payment_amount == self.down_payment_amount
            && quote.remaining_amount == self.remaining_amount
            && (quote.monthly_installment.is_none()
                || quote.monthly_installment == self.monthly_installment);
        if !matches {
            warn!(
                contract_number,
                quoted_down_payment = %quote.down_payment_amount,
                down_payment = %self.down_payment_amount,
                quoted_remaining = %quote.remaining_amount,
                remaining = %self.remaining_amount,
                "client quote ignored, amounts recomputed"
            );
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn snapshot(price: i64, min_percent: u8) -> PropertySnapshot {
        PropertySnapshot {
            property_id: 1,
            title: "Unit 12".to_string(),
            location: "Porto".to_string(),
            area_sqm: dec!(100),
            price: Money::from_major(price),
            min_down_payment_percent: min_percent,
            installment_interest_rate: Rate::ZERO,
            captured_at: Utc::now(),
        }
    }

    fn config() -> ContractConfig {
        EngineConfig::standard().contracts
    }

    #[test]
    fn test_thirty_percent_of_one_hundred_thousand() {
        let terms = ContractTerms::compute(
            &snapshot(100_000, 10),
            &TermsRequest::installment(30, 24),
            &config(),
        )
        .unwrap();

        assert_eq!(terms.down_payment_amount, Money::from_major(30_000));
        assert_eq!(terms.remaining_amount, Money::from_major(70_000));
        assert_eq!(terms.monthly_installment, Some(Money::from_str_exact("2916.67").unwrap()));
        assert_eq!(terms.final_installment(), Some(Money::from_str_exact("2916.59").unwrap()));
        assert!(terms.verify(1).is_ok());
    }

    #[test]
    fn test_amounts_always_sum_to_price() {
        let property = PropertySnapshot {
            price: Money::from_str_exact("123456.79").unwrap(),
            ..snapshot(0, 0)
        };
        for percent in [0u8, 7, 15, 33, 50, 99, 100] {
            let terms =
                ContractTerms::compute(&property, &TermsRequest::full(percent), &config()).unwrap();
            assert_eq!(
                terms.down_payment_amount + terms.remaining_amount,
                terms.purchase_price
            );
        }
    }

    #[test]
    fn test_rejects_out_of_range_terms() {
        let property = snapshot(100_000, 20);
        let cfg = config();

        assert!(ContractTerms::compute(&property, &TermsRequest::full(19), &cfg).is_err());
        assert!(ContractTerms::compute(&property, &TermsRequest::full(101), &cfg).is_err());
        assert!(ContractTerms::compute(&property, &TermsRequest::installment(30, 0), &cfg).is_err());
        assert!(ContractTerms::compute(&property, &TermsRequest::installment(30, 361), &cfg).is_err());
        assert!(ContractTerms::compute(&property, &TermsRequest::installment(100, 12), &cfg).is_err());

        let missing_months = TermsRequest {
            installment_months: None,
            ..TermsRequest::installment(30, 12)
        };
        assert!(ContractTerms::compute(&property, &missing_months, &cfg).is_err());
    }

    #[test]
    fn test_verify_detects_drift() {
        let mut terms =
            ContractTerms::compute(&snapshot(100_000, 10), &TermsRequest::full(30), &config())
                .unwrap();
        terms.down_payment_amount = Money::from_major(29_000);

        match terms.verify(5).unwrap_err() {
            PresaleError::FinancialDrift { contract_id, field, expected, .. } => {
                assert_eq!(contract_id, 5);
                assert_eq!(field, "down_payment_amount");
                assert_eq!(expected, Money::from_major(30_000));
            }
            other => panic!("expected drift, got {:?}", other),
        }
    }

    #[test]
    fn test_client_quote_is_display_only() {
        let terms =
            ContractTerms::compute(&snapshot(100_000, 10), &TermsRequest::full(30), &config())
                .unwrap();
        let quote = ClientQuote {
            down_payment_amount: Money::from_major(1),
            remaining_amount: Money::from_major(99_999),
            monthly_installment: None,
        };
        assert!(!terms.compare_quote("PC-2024-000001", &quote));
        assert_eq!(terms.down_payment_amount, Money::from_major(30_000));
    }
}
