//! Read-only aggregations over the catch-up read models.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use consignment_agreements::AgreementId;
use consignment_core::{Folio, Money, Percentage, ProductKey, SupplierId, TenantId};
use consignment_settlement::SettlementPeriod;
use consignment_stock::StockBalance;

use crate::engine::ConsignmentEngine;
use crate::error::EngineResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupplierStockReport {
    pub supplier_id: SupplierId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_name: Option<String>,
    pub agreements: usize,
    #[serde(flatten)]
    pub balance: StockBalance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSalesReport {
    pub agreement_id: AgreementId,
    #[serde(flatten)]
    pub product: ProductKey,
    pub sales: usize,
    pub units_sold: i64,
    pub settled_units: i64,
    pub pending_units: i64,
}

/// What the next liquidation of an agreement would roughly pay, at today's
/// prices and commission. Units of products no longer on the agreement have
/// no price and are counted apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingSettlementReport {
    pub agreement_id: AgreementId,
    pub folio: Folio,
    pub supplier_id: SupplierId,
    pub pending_sales: usize,
    pub pending_units: i64,
    pub unpriced_units: i64,
    pub commission_pct: Percentage,
    pub estimated_subtotal: Money,
    pub estimated_commission: Money,
    pub estimated_payable: Money,
}

impl ConsignmentEngine {
    /// Stock on hand per supplier, over all of the supplier's agreements.
    pub fn stock_by_supplier(&self, tenant_id: TenantId) -> EngineResult<Vec<SupplierStockReport>> {
        let agreements = self.read_agreements(|p| p.list(tenant_id))?;
        let records = self.read_stock(|p| p.list(tenant_id))?;

        let supplier_of: HashMap<AgreementId, SupplierId> =
            agreements.iter().map(|a| (a.agreement_id, a.supplier_id)).collect();

        let mut rows: BTreeMap<SupplierId, (usize, StockBalance)> = BTreeMap::new();
        for agreement in &agreements {
            rows.entry(agreement.supplier_id).or_default().0 += 1;
        }
        for record in &records {
            if let Some(supplier_id) = supplier_of.get(&record.key.agreement_id) {
                rows.entry(*supplier_id).or_default().1.merge(&record.balance);
            }
        }

        Ok(rows
            .into_iter()
            .map(|(supplier_id, (agreements, balance))| SupplierStockReport {
                supplier_id,
                supplier_name: self.suppliers().get(tenant_id, supplier_id).map(|s| s.name),
                agreements,
                balance,
            })
            .collect())
    }

    /// Units sold per agreement and product between `from` and `to`
    /// inclusive, split by whether a liquidation has claimed them.
    pub fn sales_by_product(
        &self,
        tenant_id: TenantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<ProductSalesReport>> {
        let period = SettlementPeriod::new(from, to)?;
        let sales = self.read_sales(|p| p.list(tenant_id))?;

        let mut rows: BTreeMap<(AgreementId, ProductKey), ProductSalesReport> = BTreeMap::new();
        for sale in sales.iter().filter(|s| period.contains(s.sold_at.date_naive())) {
            let row = rows
                .entry((sale.agreement_id, sale.product))
                .or_insert_with(|| ProductSalesReport {
                    agreement_id: sale.agreement_id,
                    product: sale.product,
                    sales: 0,
                    units_sold: 0,
                    settled_units: 0,
                    pending_units: 0,
                });
            row.sales += 1;
            row.units_sold = row.units_sold.saturating_add(sale.quantity);
            if sale.is_settled() {
                row.settled_units = row.settled_units.saturating_add(sale.quantity);
            } else {
                row.pending_units = row.pending_units.saturating_add(sale.quantity);
            }
        }
        Ok(rows.into_values().collect())
    }

    /// Agreements with sales no liquidation has claimed yet, ordered by
    /// agreement folio.
    pub fn pending_to_settle(&self, tenant_id: TenantId) -> EngineResult<Vec<PendingSettlementReport>> {
        let agreements = self.read_agreements(|p| p.list(tenant_id))?;
        let sales = self.read_sales(|p| p.list(tenant_id))?;

        let mut out = Vec::new();
        for agreement in agreements {
            let pending: Vec<_> = sales
                .iter()
                .filter(|s| s.agreement_id == agreement.agreement_id && !s.is_settled())
                .collect();
            if pending.is_empty() {
                continue;
            }

            let mut subtotal = Money::ZERO;
            let mut pending_units: i64 = 0;
            let mut unpriced_units: i64 = 0;
            for sale in &pending {
                pending_units = pending_units.saturating_add(sale.quantity);
                match agreement.products.iter().find(|p| p.key == sale.product) {
                    Some(product) => {
                        subtotal = subtotal.checked_add(product.consignment_price.checked_mul_qty(sale.quantity)?)?;
                    }
                    None => unpriced_units = unpriced_units.saturating_add(sale.quantity),
                }
            }

            let commission_pct = agreement.terms.commission_pct;
            let estimated_subtotal = subtotal.round_currency();
            let estimated_commission = estimated_subtotal.percentage(commission_pct)?;
            out.push(PendingSettlementReport {
                agreement_id: agreement.agreement_id,
                folio: agreement.folio,
                supplier_id: agreement.supplier_id,
                pending_sales: pending.len(),
                pending_units,
                unpriced_units,
                commission_pct,
                estimated_subtotal,
                estimated_commission,
                estimated_payable: estimated_subtotal.checked_sub(estimated_commission)?,
            });
        }
        Ok(out)
    }
}
