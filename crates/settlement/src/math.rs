//! Settlement arithmetic.
//!
//! ```text
//! subtotal   = Σ quantity × unit_price        (exact)
//! commission = round(subtotal × pct / 100, 2) (half away from zero)
//! payable    = subtotal − commission          (exact)
//! ```
//!
//! Rounding happens once, on the commission total. Every failure aborts the
//! whole computation; there is no partial result.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use consignment_core::{DomainError, Money, Percentage, ProductKey, SaleId};

use crate::liquidation::LiquidationItem;

/// An unsettled sale offered to `generate`, priced at the agreement's current
/// consignment price. `unit_price` is `None` when the product no longer has a
/// price on the agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedSale {
    pub sale_id: SaleId,
    pub key: ProductKey,
    pub quantity: i64,
    pub sold_on: NaiveDate,
    pub unit_price: Option<Money>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTotals {
    pub subtotal: Money,
    pub commission_pct: Percentage,
    pub commission: Money,
    pub total_payable: Money,
    pub total_units: i64,
}

/// Group sales into one item per product key, in key order.
pub fn build_items(sales: &[PricedSale]) -> Result<Vec<LiquidationItem>, DomainError> {
    let mut seen = HashSet::with_capacity(sales.len());
    let mut grouped: BTreeMap<ProductKey, (i64, Money)> = BTreeMap::new();

    for sale in sales {
        if !seen.insert(sale.sale_id) {
            return Err(DomainError::invariant(format!(
                "sale {} offered twice",
                sale.sale_id
            )));
        }
        if sale.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "sale {} has non-positive quantity {}",
                sale.sale_id, sale.quantity
            )));
        }
        let price = sale.unit_price.ok_or_else(|| {
            DomainError::validation(format!("missing consignment price for product {}", sale.key))
        })?;

        match grouped.get_mut(&sale.key) {
            Some((qty, existing)) => {
                if *existing != price {
                    return Err(DomainError::invariant(format!(
                        "conflicting prices for product {}",
                        sale.key
                    )));
                }
                *qty = qty
                    .checked_add(sale.quantity)
                    .ok_or_else(|| DomainError::validation("quantity overflow"))?;
            }
            None => {
                grouped.insert(sale.key, (sale.quantity, price));
            }
        }
    }

    grouped
        .into_iter()
        .map(|(key, (quantity, unit_price))| {
            Ok(LiquidationItem {
                key,
                quantity,
                unit_price,
                line_subtotal: unit_price.checked_mul_qty(quantity)?,
            })
        })
        .collect()
}

pub fn compute_totals(
    items: &[LiquidationItem],
    commission_pct: Percentage,
) -> Result<SettlementTotals, DomainError> {
    if items.is_empty() {
        return Err(DomainError::NoSalesInPeriod);
    }

    let mut subtotal = Money::ZERO;
    let mut total_units: i64 = 0;
    for item in items {
        if item.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "item {} has non-positive quantity",
                item.key
            )));
        }
        let line = item.unit_price.checked_mul_qty(item.quantity)?;
        if line != item.line_subtotal {
            return Err(DomainError::invariant(format!(
                "line subtotal of {} does not match quantity × price",
                item.key
            )));
        }
        subtotal = subtotal.checked_add(line)?;
        total_units = total_units
            .checked_add(item.quantity)
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;
    }

    let subtotal = subtotal.round_currency();
    let commission = subtotal.percentage(commission_pct)?;
    let total_payable = subtotal.checked_sub(commission)?;

    Ok(SettlementTotals {
        subtotal,
        commission_pct,
        commission,
        total_payable,
        total_units,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use consignment_core::ProductId;
    use proptest::prelude::*;
    use rust_decimal::{Decimal, RoundingStrategy};
    use rust_decimal_macros::dec;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn sale(key: ProductKey, quantity: i64, price: Option<Decimal>) -> PricedSale {
        PricedSale {
            sale_id: SaleId::new(),
            key,
            quantity,
            sold_on: day(),
            unit_price: price.map(Money::new),
        }
    }

    fn pct(v: Decimal) -> Percentage {
        Percentage::new(v).unwrap()
    }

    #[test]
    fn thirty_units_at_fifty_with_ten_percent() {
        let key = ProductKey::new(ProductId::new(), None);
        let items = build_items(&[
            sale(key, 10, Some(dec!(50))),
            sale(key, 20, Some(dec!(50))),
        ])
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 30);

        let totals = compute_totals(&items, pct(dec!(10))).unwrap();
        assert_eq!(totals.subtotal.amount(), dec!(1500.00));
        assert_eq!(totals.commission.amount(), dec!(150.00));
        assert_eq!(totals.total_payable.amount(), dec!(1350.00));
        assert_eq!(totals.total_units, 30);
        assert_eq!(totals.total_payable.to_string(), "1350.00");
    }

    #[test]
    fn rounding_applies_to_total_not_lines() {
        // Three lines of 0.05 at 10%: per-line rounding would give 0.01 × 3 = 0.03,
        // total rounding gives round(0.015) = 0.02.
        let items = build_items(&[
            sale(ProductKey::new(ProductId::new(), None), 1, Some(dec!(0.05))),
            sale(ProductKey::new(ProductId::new(), None), 1, Some(dec!(0.05))),
            sale(ProductKey::new(ProductId::new(), None), 1, Some(dec!(0.05))),
        ])
        .unwrap();
        let totals = compute_totals(&items, pct(dec!(10))).unwrap();
        assert_eq!(totals.subtotal.amount(), dec!(0.15));
        assert_eq!(totals.commission.amount(), dec!(0.02));
        assert_eq!(totals.total_payable.amount(), dec!(0.13));
    }

    #[test]
    fn missing_price_fails_the_whole_batch() {
        let priced = ProductKey::new(ProductId::new(), None);
        let unpriced = ProductKey::new(ProductId::new(), None);
        let err = build_items(&[sale(priced, 1, Some(dec!(10))), sale(unpriced, 1, None)])
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("missing consignment price")));
    }

    #[test]
    fn duplicate_sale_is_rejected() {
        let key = ProductKey::new(ProductId::new(), None);
        let s = sale(key, 1, Some(dec!(10)));
        assert!(matches!(
            build_items(&[s.clone(), s]),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn no_items_means_no_sales() {
        assert_eq!(
            compute_totals(&[], pct(dec!(10))).unwrap_err(),
            DomainError::NoSalesInPeriod
        );
    }

    #[test]
    fn tampered_line_subtotal_is_detected() {
        let key = ProductKey::new(ProductId::new(), None);
        let mut items = build_items(&[sale(key, 2, Some(dec!(10)))]).unwrap();
        items[0].line_subtotal = Money::new(dec!(21));
        assert!(matches!(
            compute_totals(&items, pct(dec!(10))),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    fn price_cents() -> impl Strategy<Value = i64> {
        0i64..1_000_000
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 500, ..ProptestConfig::default() })]

        #[test]
        fn payable_plus_commission_is_subtotal(
            lines in prop::collection::vec((1i64..500, price_cents()), 1..20),
            pct_bp in 0i64..=10_000,
        ) {
            let sales: Vec<PricedSale> = lines
                .iter()
                .map(|(qty, cents)| sale(
                    ProductKey::new(ProductId::new(), None),
                    *qty,
                    Some(Decimal::new(*cents, 2)),
                ))
                .collect();
            let pct = pct(Decimal::new(pct_bp, 2));
            let items = build_items(&sales).unwrap();
            let totals = compute_totals(&items, pct).unwrap();

            let expected_subtotal: Decimal = lines
                .iter()
                .map(|(qty, cents)| Decimal::new(*cents, 2) * Decimal::from(*qty))
                .sum();
            let expected_commission = (expected_subtotal * pct.value() / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

            prop_assert_eq!(totals.subtotal.amount(), expected_subtotal);
            prop_assert_eq!(totals.commission.amount(), expected_commission);
            prop_assert_eq!(
                totals.total_payable.amount() + totals.commission.amount(),
                totals.subtotal.amount()
            );
            prop_assert_eq!(totals.total_units, lines.iter().map(|(q, _)| q).sum::<i64>());
        }

        #[test]
        fn grouping_does_not_change_totals(
            quantities in prop::collection::vec(1i64..100, 1..15),
            cents in price_cents(),
        ) {
            let key = ProductKey::new(ProductId::new(), None);
            let price = Decimal::new(cents, 2);
            let sales: Vec<PricedSale> = quantities.iter().map(|q| sale(key, *q, Some(price))).collect();
            let items = build_items(&sales).unwrap();
            prop_assert_eq!(items.len(), 1);
            prop_assert_eq!(items[0].quantity, quantities.iter().sum::<i64>());
        }
    }
}
