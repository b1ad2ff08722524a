//! Fixed-point monetary amounts and percentages.
//!
//! Amounts are `rust_decimal::Decimal` values; floating point never touches
//! money. Rounding to the currency scale (2 places, half away from zero) is an
//! explicit step the caller takes once, on totals.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Decimal places of the settlement currency.
pub const CURRENCY_SCALE: u32 = 2;

/// A monetary amount in the organization's single currency.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// A unit price: non-negative, at most currency precision.
    pub fn price(amount: Decimal) -> DomainResult<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::validation("price must be >= 0"));
        }
        if amount.normalize().scale() > CURRENCY_SCALE {
            return Err(DomainError::validation(format!(
                "price must have at most {CURRENCY_SCALE} decimal places"
            )));
        }
        Ok(Self(amount))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::validation("monetary overflow"))
    }

    pub fn checked_sub(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::validation("monetary overflow"))
    }

    /// `self × quantity`, exact.
    pub fn checked_mul_qty(self, quantity: i64) -> DomainResult<Money> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Money)
            .ok_or_else(|| DomainError::validation("monetary overflow"))
    }

    /// `round(self × pct / 100, 2)`.
    pub fn percentage(self, pct: Percentage) -> DomainResult<Money> {
        let raw = self
            .0
            .checked_mul(pct.value())
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .ok_or_else(|| DomainError::validation("monetary overflow"))?;
        Ok(Money(raw).round_currency())
    }

    /// Round half away from zero to the currency scale and pin the scale so
    /// the amount always renders with two decimals.
    pub fn round_currency(self) -> Money {
        let mut rounded = self
            .0
            .round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(CURRENCY_SCALE);
        Money(rounded)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.round_currency().0, f)
    }
}

impl ValueObject for Money {}

/// A percentage in the closed range `[0, 100]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(format!(
                "percentage must be within [0, 100], got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Percentage {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Percentage::new(value)
    }
}

impl From<Percentage> for Decimal {
    fn from(value: Percentage) -> Self {
        value.0
    }
}

impl core::fmt::Display for Percentage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl ValueObject for Percentage {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn percentage_rejects_out_of_range() {
        assert!(Percentage::new(dec!(-0.01)).is_err());
        assert!(Percentage::new(dec!(100.01)).is_err());
        assert!(Percentage::new(dec!(0)).is_ok());
        assert!(Percentage::new(dec!(100)).is_ok());
    }

    #[test]
    fn percentage_rejects_out_of_range_on_deserialize() {
        let err = serde_json::from_str::<Percentage>("\"120\"");
        assert!(err.is_err());
        let ok: Percentage = serde_json::from_str("\"12.5\"").unwrap();
        assert_eq!(ok.value(), dec!(12.5));
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(Money::new(dec!(0.125)).round_currency().amount(), dec!(0.13));
        assert_eq!(Money::new(dec!(0.124)).round_currency().amount(), dec!(0.12));
        assert_eq!(Money::new(dec!(-0.125)).round_currency().amount(), dec!(-0.13));
    }

    #[test]
    fn rounded_amounts_render_two_decimals() {
        assert_eq!(Money::new(dec!(1500)).to_string(), "1500.00");
        assert_eq!(Money::new(dec!(1.5)).round_currency().amount().to_string(), "1.50");
    }

    #[test]
    fn commission_of_ten_percent() {
        let pct = Percentage::new(dec!(10)).unwrap();
        assert_eq!(Money::new(dec!(1500)).percentage(pct).unwrap().amount(), dec!(150.00));
    }

    #[test]
    fn price_rejects_negative_and_sub_cent() {
        assert!(Money::price(dec!(-1)).is_err());
        assert!(Money::price(dec!(1.001)).is_err());
        assert!(Money::price(dec!(1.100)).is_ok());
        assert!(Money::price(dec!(0)).is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 500, ..ProptestConfig::default() })]

        #[test]
        fn percentage_result_has_currency_scale(cents in 0i64..10_000_000, pct_bp in 0u32..=10_000) {
            let amount = Money::new(Decimal::new(cents, 2));
            let pct = Percentage::new(Decimal::new(pct_bp as i64, 2)).unwrap();
            let commission = amount.percentage(pct).unwrap();
            prop_assert_eq!(commission.amount().scale(), CURRENCY_SCALE);
            prop_assert!(commission.amount() <= amount.amount());
        }
    }
}
