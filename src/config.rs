use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{PresaleError, Result};
use crate::interest::DayCountConvention;
use crate::types::QualificationBasis;

/// longest cooling-off period accepted from configuration
pub const MAX_WITHDRAWAL_WINDOW_DAYS: i64 = 365;
/// longest base delay between contract document attempts (one week)
pub const MAX_RETRY_BACKOFF_MINUTES: i64 = 7 * 24 * 60;
pub const MAX_DOCUMENT_ATTEMPTS: u32 = 100;

/// engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub interest: InterestConfig,
    pub contracts: ContractConfig,
    pub documents: DocumentConfig,
}

/// wallet interest configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestConfig {
    /// system-wide annual rate applied to qualifying wallets
    pub annual_rate: Rate,
    pub day_count_convention: DayCountConvention,
    /// deposit size that makes a wallet qualify for interest
    pub qualification_threshold: Money,
    pub qualification_basis: QualificationBasis,
}

/// contract workflow configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// cooling-off period after signature, in days
    pub withdrawal_window_days: i64,
    pub contract_number_prefix: String,
    pub max_installment_months: u32,
}

/// contract document generation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentConfig {
    pub max_attempts: u32,
    pub retry_backoff_minutes: i64,
}

impl EngineConfig {
    /// production defaults: 7% interest from a single 10,000 deposit, 14-day cooling-off
    pub fn standard() -> Self {
        Self {
            interest: InterestConfig {
                annual_rate: Rate::from_decimal(dec!(0.07)),
                day_count_convention: DayCountConvention::Actual365,
                qualification_threshold: Money::from_major(10_000),
                qualification_basis: QualificationBasis::SingleDeposit,
            },
            contracts: ContractConfig {
                withdrawal_window_days: 14,
                contract_number_prefix: "PC".to_string(),
                max_installment_months: 360,
            },
            documents: DocumentConfig {
                max_attempts: 5,
                retry_backoff_minutes: 15,
            },
        }
    }

    pub fn with_annual_rate(mut self, rate: Rate) -> Self {
        self.interest.annual_rate = rate;
        self
    }

    pub fn with_qualification_threshold(mut self, threshold: Money) -> Self {
        self.interest.qualification_threshold = threshold;
        self
    }

    pub fn with_qualification_basis(mut self, basis: QualificationBasis) -> Self {
        self.interest.qualification_basis = basis;
        self
    }

    pub fn with_document_retries(mut self, max_attempts: u32, backoff_minutes: i64) -> Self {
        self.documents.max_attempts = max_attempts;
        self.documents.retry_backoff_minutes = backoff_minutes;
        self
    }

    /// parse and validate a json document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json).map_err(|e| {
            PresaleError::InvalidConfiguration {
                message: e.to_string(),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PresaleError::InvalidConfiguration {
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.interest.annual_rate.is_negative() {
            return Err(invalid("annual_rate must not be negative"));
        }
        if self.interest.qualification_threshold.is_negative() {
            return Err(invalid("qualification_threshold must not be negative"));
        }
        if self.contracts.withdrawal_window_days <= 0 {
            return Err(invalid("withdrawal_window_days must be positive"));
        }
        if self.contracts.withdrawal_window_days > MAX_WITHDRAWAL_WINDOW_DAYS {
            return Err(invalid("withdrawal_window_days is too large"));
        }
        if self.contracts.contract_number_prefix.trim().is_empty() {
            return Err(invalid("contract_number_prefix must not be empty"));
        }
        if self.contracts.max_installment_months == 0 {
            return Err(invalid("max_installment_months must be positive"));
        }
        if self.documents.max_attempts == 0 || self.documents.max_attempts > MAX_DOCUMENT_ATTEMPTS {
            return Err(invalid("documents.max_attempts must be between 1 and 100"));
        }
        if !(0..=MAX_RETRY_BACKOFF_MINUTES).contains(&self.documents.retry_backoff_minutes) {
            return Err(invalid("documents.retry_backoff_minutes must be between 0 and one week"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::standard()
    }
}

fn invalid(message: &str) -> PresaleError {
    PresaleError::InvalidConfiguration {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_config_is_valid() {
        let config = EngineConfig::standard();
        assert!(config.validate().is_ok());
        assert_eq!(config.contracts.withdrawal_window_days, 14);
        assert_eq!(config.interest.qualification_threshold, Money::from_major(10_000));
    }

    #[test]
    fn test_json_round_trip_preserves_overrides() {
        let config = EngineConfig::standard()
            .with_annual_rate(Rate::from_percentage(5))
            .with_qualification_basis(QualificationBasis::Cumulative);

        let json = config.to_json().unwrap();
        let parsed = EngineConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::standard();
        config.contracts.withdrawal_window_days = 0;
        assert!(matches!(
            config.validate(),
            Err(PresaleError::InvalidConfiguration { .. })
        ));

        assert!(EngineConfig::from_json("{ not json").is_err());
    }

    #[test]
    fn test_oversized_durations_rejected() {
        let mut config = EngineConfig::standard();
        config.contracts.withdrawal_window_days = i64::MAX;
        assert!(matches!(
            config.validate(),
            Err(PresaleError::InvalidConfiguration { .. })
        ));

        let mut config = EngineConfig::standard();
        config.documents.retry_backoff_minutes = i64::MAX;
        let json = config.to_json().unwrap();
        assert!(matches!(
            EngineConfig::from_json(&json),
            Err(PresaleError::InvalidConfiguration { .. })
        ));

        let mut config = EngineConfig::standard();
        config.contracts.withdrawal_window_days = MAX_WITHDRAWAL_WINDOW_DAYS;
        config.documents.retry_backoff_minutes = MAX_RETRY_BACKOFF_MINUTES;
        config.documents.max_attempts = MAX_DOCUMENT_ATTEMPTS;
        assert!(config.validate().is_ok());
    }
}
