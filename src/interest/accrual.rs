use chrono::{DateTime, Datelike, Utc};

use crate::decimal::{Money, Rate};

/// day count convention for interest calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DayCountConvention {
    /// actual days / 365
    Actual365,
    /// actual days / 360
    Actual360,
    /// actual days / actual days in year (handles leap years)
    ActualActual,
}

/// day counting and simple interest for a convention
#[derive(Debug, Clone, Copy)]
pub struct AccrualCalculator {
    pub convention: DayCountConvention,
}

impl AccrualCalculator {
    pub fn new(convention: DayCountConvention) -> Self {
        Self { convention }
    }

    /// whole days elapsed between two instants, never negative
    pub fn calculate_days(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
        let days = (end - start).num_days();
        if days <= 0 {
            0
        } else {
            days as u32
        }
    }

    /// get year basis for the convention
    pub fn year_basis(&self, year: i32) -> u32 {
        match self.convention {
            DayCountConvention::Actual365 => 365,
            DayCountConvention::Actual360 => 360,
            DayCountConvention::ActualActual => {
                if is_leap_year(year) {
                    366
                } else {
                    365
                }
            }
        }
    }

    /// interest = round2(principal × rate × days / basis)
    pub fn simple_interest(
        &self,
        principal: Money,
        annual_rate: Rate,
        days: u32,
        period_end: DateTime<Utc>,
    ) -> Money {
        principal.simple_interest(annual_rate, days, self.year_basis(period_end.year()))
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_day_counting() {
        let calc = AccrualCalculator::new(DayCountConvention::Actual365);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(calc.calculate_days(start, start + Duration::days(31)), 31);
        // partial days are not counted
        assert_eq!(calc.calculate_days(start, start + Duration::hours(47)), 1);
        assert_eq!(calc.calculate_days(start + Duration::days(2), start), 0);
    }

    #[test]
    fn test_year_basis() {
        assert_eq!(AccrualCalculator::new(DayCountConvention::Actual360).year_basis(2023), 360);
        let actual = AccrualCalculator::new(DayCountConvention::ActualActual);
        assert_eq!(actual.year_basis(2024), 366);
        assert_eq!(actual.year_basis(2023), 365);
        assert_eq!(actual.year_basis(1900), 365);
        assert_eq!(actual.year_basis(2000), 366);
    }

    #[test]
    fn test_thirty_day_interest_on_ten_thousand() {
        let calc = AccrualCalculator::new(DayCountConvention::Actual365);
        let end = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let interest = calc.simple_interest(
            Money::from_major(10_000),
            Rate::from_percentage(7),
            30,
            end,
        );
        assert_eq!(interest, Money::from_str_exact("57.53").unwrap());
    }
}
