use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use consignment_agreements::AgreementId;
use consignment_core::{DomainError, Folio, LiquidationId, Money, ProductKey, SaleId};

use crate::math::SettlementTotals;

/// Inclusive date range `[from, to]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettlementPeriod {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl SettlementPeriod {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, DomainError> {
        if from > to {
            return Err(DomainError::validation(format!(
                "period start {from} is after its end {to}"
            )));
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    pub fn overlaps(&self, other: &SettlementPeriod) -> bool {
        self.from <= other.to && other.from <= self.to
    }
}

impl core::fmt::Display for SettlementPeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquidationStatus {
    #[serde(rename = "draft")]
    Draft,
    #[serde(rename = "confirmed")]
    Confirmed,
    #[serde(rename = "pagada")]
    Paid,
    #[serde(rename = "cancelada")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidationAction {
    Confirm,
    Pay,
    Cancel,
}

impl LiquidationStatus {
    pub fn on(self, action: LiquidationAction) -> Result<LiquidationStatus, DomainError> {
        use LiquidationAction::*;
        use LiquidationStatus::*;

        match (self, action) {
            (Draft, Confirm) => Ok(Confirmed),
            (Confirmed, Pay) => Ok(Paid),
            (Draft, Cancel) | (Confirmed, Cancel) => Ok(Cancelled),
            (Draft, Pay)
            | (Confirmed, Confirm)
            | (Paid, Confirm)
            | (Paid, Pay)
            | (Paid, Cancel)
            | (Cancelled, Confirm)
            | (Cancelled, Pay)
            | (Cancelled, Cancel) => Err(DomainError::invalid_transition(self, action)),
        }
    }

    /// Still claims its sales and its period.
    pub fn is_in_force(self) -> bool {
        !matches!(self, LiquidationStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LiquidationStatus::Draft => "draft",
            LiquidationStatus::Confirmed => "confirmed",
            LiquidationStatus::Paid => "pagada",
            LiquidationStatus::Cancelled => "cancelada",
        }
    }
}

impl core::fmt::Display for LiquidationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::fmt::Display for LiquidationAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            LiquidationAction::Confirm => "confirm",
            LiquidationAction::Pay => "pay",
            LiquidationAction::Cancel => "cancel",
        })
    }
}

/// One line per product (and variant) sold in the period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationItem {
    #[serde(flatten)]
    pub key: ProductKey,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_subtotal: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub paid_on: NaiveDate,
    pub method: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Liquidation {
    pub id: LiquidationId,
    pub folio: Folio,
    pub agreement_id: AgreementId,
    pub period: SettlementPeriod,
    pub status: LiquidationStatus,
    pub items: Vec<LiquidationItem>,
    pub sale_ids: Vec<SaleId>,
    pub totals: SettlementTotals,
    pub idempotency_key: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub payment: Option<PaymentInfo>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn period_bounds_are_inclusive() {
        let p = SettlementPeriod::new(d(2024, 1, 1), d(2024, 1, 31)).unwrap();
        assert!(p.contains(d(2024, 1, 1)));
        assert!(p.contains(d(2024, 1, 31)));
        assert!(!p.contains(d(2024, 2, 1)));
    }

    #[test]
    fn periods_touching_on_one_day_overlap() {
        let jan = SettlementPeriod::new(d(2024, 1, 1), d(2024, 1, 31)).unwrap();
        let edge = SettlementPeriod::new(d(2024, 1, 31), d(2024, 2, 15)).unwrap();
        let feb = SettlementPeriod::new(d(2024, 2, 1), d(2024, 2, 29)).unwrap();
        assert!(jan.overlaps(&edge));
        assert!(edge.overlaps(&jan));
        assert!(!jan.overlaps(&feb));
    }

    #[test]
    fn reversed_period_is_invalid() {
        assert!(SettlementPeriod::new(d(2024, 2, 1), d(2024, 1, 1)).is_err());
    }

    #[test]
    fn status_table() {
        use LiquidationAction::*;
        use LiquidationStatus::*;

        assert_eq!(Draft.on(Confirm), Ok(Confirmed));
        assert_eq!(Confirmed.on(Pay), Ok(Paid));
        assert_eq!(Draft.on(Cancel), Ok(Cancelled));
        assert_eq!(Confirmed.on(Cancel), Ok(Cancelled));

        for action in [Confirm, Pay, Cancel] {
            assert!(Paid.on(action).is_err());
            assert!(Cancelled.on(action).is_err());
        }
        assert!(Draft.on(Pay).is_err());
    }

    #[test]
    fn only_cancelled_releases_its_claim() {
        assert!(LiquidationStatus::Draft.is_in_force());
        assert!(LiquidationStatus::Paid.is_in_force());
        assert!(!LiquidationStatus::Cancelled.is_in_force());
        assert_eq!(LiquidationStatus::Paid.to_string(), "pagada");
    }
}
