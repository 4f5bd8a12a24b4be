use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};
use std::str::FromStr;

/// currency scale used for every stored amount
pub const MONEY_DP: u32 = 2;

/// round a decimal to cents, half-up (midpoint away from zero)
pub fn round2(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Money type with cent precision and half-up rounding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    pub const ONE: Money = Money(Decimal::ONE);
    pub const CENT: Money = Money(Decimal::from_parts(1, 0, 0, false, 2));

    /// create from decimal, rounding half-up to cents
    pub fn from_decimal(d: Decimal) -> Self {
        Money(round2(d))
    }

    /// create from string with exact parsing
    pub fn from_str_exact(s: &str) -> Result<Self, rust_decimal::Error> {
        Ok(Money(round2(Decimal::from_str(s)?)))
    }

    /// create from whole currency units
    pub fn from_major(amount: i64) -> Self {
        Money(Decimal::from(amount))
    }

    /// create from cents
    pub fn from_minor(cents: i64) -> Self {
        Money(Decimal::new(cents, MONEY_DP))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }

    /// subtraction that refuses to go below zero
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        if other > self {
            None
        } else {
            Some(self - other)
        }
    }

    /// percentage of this amount (e.g. 30 for 30%), rounded half-up to cents
    pub fn percentage(&self, percent: Decimal) -> Self {
        Money::from_decimal(self.0 * percent / Decimal::from(100))
    }

    /// simple interest for `days` at an annual rate over a `year_basis`-day year
    pub fn simple_interest(&self, annual_rate: Rate, days: u32, year_basis: u32) -> Self {
        if year_basis == 0 {
            return Money::ZERO;
        }
        let interest = self.0 * annual_rate.as_decimal() * Decimal::from(days)
            / Decimal::from(year_basis);
        Money::from_decimal(interest)
    }

    /// split into `parts` equal cent amounts; the last part absorbs the
    /// rounding remainder so the parts always sum to `self`
    pub fn split_even(&self, parts: u32) -> Vec<Money> {
        if parts == 0 {
            return Vec::new();
        }
        let count = Decimal::from(parts);
        let leading = Decimal::from(parts - 1);

        let mut share = round2(self.0 / count);
        if share * leading > self.0 {
            // half-up overshoot on tiny amounts; fall back to truncation
            share = (self.0 / count).round_dp_with_strategy(MONEY_DP, RoundingStrategy::ToZero);
        }

        let mut shares = vec![Money(share); (parts - 1) as usize];
        shares.push(Money(self.0 - share * leading));
        shares
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::from_str_exact(s)
    }
}

impl From<Decimal> for Money {
    fn from(d: Decimal) -> Self {
        Money::from_decimal(d)
    }
}

impl From<i32> for Money {
    fn from(i: i32) -> Self {
        Money::from_major(i as i64)
    }
}

impl From<u32> for Money {
    fn from(i: u32) -> Self {
        Money::from_major(i as i64)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money(round2(self.0 + other.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Money) {
        self.0 = round2(self.0 + other.0);
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, other: Money) -> Money {
        Money(round2(self.0 - other.0))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Money) {
        self.0 = round2(self.0 - other.0);
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, other: Decimal) -> Money {
        Money(round2(self.0 * other))
    }
}

impl Div<Decimal> for Money {
    type Output = Money;

    fn div(self, other: Decimal) -> Money {
        Money(round2(self.0 / other))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

/// rate type for interest rates and ratios
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    /// create from decimal (e.g., 0.07 for 7%)
    pub fn from_decimal(d: Decimal) -> Self {
        Rate(d)
    }

    /// create from whole percentage (e.g., 7 for 7%)
    pub fn from_percentage(p: u32) -> Self {
        Rate(Decimal::from(p) / Decimal::from(100))
    }

    /// create from a fractional percentage (e.g., 5.5 for 5.5%)
    pub fn from_percentage_decimal(p: Decimal) -> Self {
        Rate(p / Decimal::from(100))
    }

    /// create from basis points (e.g., 700 for 7%)
    pub fn from_bps(bps: u32) -> Self {
        Rate(Decimal::from(bps) / Decimal::from(10000))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn as_percentage(&self) -> Decimal {
        self.0 * Decimal::from(100)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// monthly rate from annual rate
    pub fn monthly_rate(&self) -> Rate {
        Rate(self.0 / Decimal::from(12))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().normalize())
    }
}

impl From<Decimal> for Rate {
    fn from(d: Decimal) -> Self {
        Rate::from_decimal(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_half_up_rounding() {
        // banker's rounding would give 0.12 here
        assert_eq!(Money::from_decimal(dec!(0.125)), Money::from_minor(13));
        assert_eq!(Money::from_decimal(dec!(2916.665)), Money::from_str_exact("2916.67").unwrap());
        assert_eq!(Money::from_decimal(dec!(-0.125)), Money::from_minor(-13));
    }

    #[test]
    fn test_display_always_two_places() {
        assert_eq!(Money::from_major(30_000).to_string(), "30000.00");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
    }

    #[test]
    fn test_percentage() {
        let price = Money::from_major(100_000);
        assert_eq!(price.percentage(dec!(30)), Money::from_major(30_000));

        let odd = Money::from_str_exact("123456.78").unwrap();
        assert_eq!(odd.percentage(dec!(15)), Money::from_str_exact("18518.52").unwrap());
    }

    #[test]
    fn test_split_even_absorbs_remainder_last() {
        let remaining = Money::from_major(70_000);
        let parts = remaining.split_even(24);

        assert_eq!(parts.len(), 24);
        let installment = Money::from_str_exact("2916.67").unwrap();
        for part in &parts[..23] {
            assert_eq!(*part, installment);
        }
        assert_eq!(parts[23], Money::from_str_exact("2916.59").unwrap());
        assert_eq!(parts.iter().copied().sum::<Money>(), remaining);
    }

    #[test]
    fn test_split_even_tiny_amount_never_negative() {
        let parts = Money::from_minor(5).split_even(10);
        assert!(parts.iter().all(|p| !p.is_negative()));
        assert_eq!(parts.iter().copied().sum::<Money>(), Money::from_minor(5));
    }

    #[test]
    fn test_simple_interest() {
        let balance = Money::from_major(10_000);
        let interest = balance.simple_interest(Rate::from_percentage(7), 30, 365);
        assert_eq!(interest, Money::from_str_exact("57.53").unwrap());
    }

    #[test]
    fn test_checked_sub() {
        let a = Money::from_major(10);
        assert_eq!(a.checked_sub(Money::from_major(4)), Some(Money::from_major(6)));
        assert_eq!(a.checked_sub(Money::from_major(11)), None);
    }

    #[test]
    fn test_rate_conversions() {
        assert_eq!(Rate::from_bps(700), Rate::from_percentage(7));
        assert_eq!(Rate::from_percentage_decimal(dec!(5.5)).as_decimal(), dec!(0.055));
        assert_eq!(Rate::from_percentage(7).to_string(), "7%");
    }
}
