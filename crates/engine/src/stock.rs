//! Consignment Stock Ledger operations.
//!
//! Each line of a multi-item request is its own append on its own record
//! stream. Every line is checked against the agreement and the current
//! balances before the first append, so a request that is invalid as a whole
//! writes nothing.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use consignment_agreements::{Agreement, AgreementId, AgreementProduct};
use consignment_core::{AggregateId, DomainError, LineItem, ProductId, ProductKey, SaleId, TenantId};
use consignment_infra::projections::StockRecordView;
use consignment_stock::{
    AGGREGATE_TYPE, AdjustStock, ConsignmentStock, ReceiveStock, ReturnStock, SellStock,
    StockBalance, StockCommand, StockRecordId, StockRecordKey,
};

use crate::engine::ConsignmentEngine;
use crate::error::{EngineError, EngineResult};

/// One line of a receipt or return.
#[derive(Debug, Clone)]
pub struct MovementLine {
    pub item: LineItem,
    pub notes: Option<String>,
}

impl MovementLine {
    pub fn new(item: LineItem) -> Self {
        Self { item, notes: None }
    }
}

#[derive(Debug, Clone)]
pub struct NewSale {
    pub item: LineItem,
    pub sale_ref: String,
    /// Point-of-sale time when posting after the fact; now when omitted.
    pub sold_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedSale {
    pub sale_id: SaleId,
    pub sold_at: DateTime<Utc>,
    pub record: StockRecordView,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StockFilter {
    pub agreement_id: Option<AgreementId>,
    pub product_id: Option<ProductId>,
    pub only_available: bool,
}

fn make_stock(_: TenantId, id: AggregateId) -> ConsignmentStock {
    ConsignmentStock::empty(StockRecordId::new(id))
}

fn agreement_product<'a>(agreement: &'a Agreement, key: &ProductKey) -> EngineResult<&'a AgreementProduct> {
    agreement.product(key).ok_or_else(|| {
        DomainError::validation(format!(
            "product {key} is not part of agreement {}",
            agreement.id_typed()
        ))
        .into()
    })
}

fn ensure_active_product(agreement: &Agreement, key: &ProductKey, what: &str) -> EngineResult<()> {
    if !agreement_product(agreement, key)?.active {
        return Err(DomainError::invalid_state(format!("cannot {what}: product {key} is inactive")).into());
    }
    Ok(())
}

fn ensure_distinct(lines: &[MovementLine]) -> EngineResult<()> {
    if lines.is_empty() {
        return Err(DomainError::validation("at least one item is required").into());
    }
    let mut seen = HashSet::with_capacity(lines.len());
    for line in lines {
        if !seen.insert(line.item.key) {
            return Err(DomainError::validation(format!("product {} is listed twice", line.item.key)).into());
        }
    }
    Ok(())
}

impl ConsignmentEngine {
    /// Receive consigned units of one product.
    pub fn receive(
        &self,
        tenant_id: TenantId,
        agreement_id: AgreementId,
        line: MovementLine,
    ) -> EngineResult<StockRecordView> {
        let mut views = self.receive_items(tenant_id, agreement_id, vec![line])?;
        views.pop().ok_or_else(|| EngineError::Corrupt("receipt produced no stock record".into()))
    }

    /// Receive several products at once. The agreement must be active or
    /// paused and every product active on it.
    #[instrument(
        skip(self, lines),
        fields(tenant_id = %tenant_id, agreement_id = %agreement_id, items = lines.len()),
        err
    )]
    pub fn receive_items(
        &self,
        tenant_id: TenantId,
        agreement_id: AgreementId,
        lines: Vec<MovementLine>,
    ) -> EngineResult<Vec<StockRecordView>> {
        ensure_distinct(&lines)?;
        let agreement = self.load_agreement(tenant_id, agreement_id)?;
        let status = agreement.status();
        if !status.accepts_receipts() {
            return Err(DomainError::invalid_state(format!("cannot receive stock: agreement is {status}")).into());
        }
        for line in &lines {
            ensure_active_product(&agreement, &line.item.key, "receive stock")?;
        }

        let location_id = agreement.terms().and_then(|t| t.location_id);
        let mut record_ids = Vec::with_capacity(lines.len());
        for line in lines {
            let key = StockRecordKey::new(agreement_id, line.item.key, location_id);
            let record_id = StockRecordId::for_key(&key);
            let command = StockCommand::ReceiveStock(ReceiveStock {
                tenant_id,
                record_id,
                key,
                quantity: line.item.quantity,
                notes: line.notes,
                occurred_at: Utc::now(),
            });
            self.dispatch(tenant_id, record_id.0, AGGREGATE_TYPE, || Ok(command.clone()), make_stock)?;
            record_ids.push(record_id);
        }
        self.record_views(tenant_id, &record_ids)
    }

    /// Record a consigned sale. The sale stays pending until a liquidation
    /// claims it.
    #[instrument(
        skip(self, sale),
        fields(tenant_id = %tenant_id, agreement_id = %agreement_id, product = %sale.item.key, quantity = sale.item.quantity),
        err
    )]
    pub fn sell(&self, tenant_id: TenantId, agreement_id: AgreementId, sale: NewSale) -> EngineResult<RecordedSale> {
        let agreement = self.load_agreement(tenant_id, agreement_id)?;
        let status = agreement.status();
        if !status.accepts_sales() {
            return Err(DomainError::invalid_state(format!("cannot sell: agreement is {status}")).into());
        }
        ensure_active_product(&agreement, &sale.item.key, "sell")?;

        let key = self.pick_record(tenant_id, &agreement, sale.item.key, Some(sale.item.quantity))?;
        let record_id = StockRecordId::for_key(&key);
        let sale_id = SaleId::new();
        let sold_at = sale.sold_at.unwrap_or_else(Utc::now);
        let command = StockCommand::SellStock(SellStock {
            tenant_id,
            record_id,
            sale_id,
            quantity: sale.item.quantity,
            sale_ref: sale.sale_ref,
            occurred_at: sold_at,
        });
        self.dispatch(tenant_id, record_id.0, AGGREGATE_TYPE, || Ok(command.clone()), make_stock)?;
        info!(%sale_id, %record_id, "consigned sale recorded");

        Ok(RecordedSale {
            sale_id,
            sold_at,
            record: self.record_view(tenant_id, record_id)?,
        })
    }

    /// Return units of one product to the supplier.
    pub fn return_to_supplier(
        &self,
        tenant_id: TenantId,
        agreement_id: AgreementId,
        line: MovementLine,
    ) -> EngineResult<StockRecordView> {
        let mut views = self.return_items(tenant_id, agreement_id, vec![line])?;
        views.pop().ok_or_else(|| EngineError::Corrupt("return produced no stock record".into()))
    }

    /// Return several products at once. Allowed on active, paused and
    /// terminated agreements, and for inactive products.
    #[instrument(
        skip(self, lines),
        fields(tenant_id = %tenant_id, agreement_id = %agreement_id, items = lines.len()),
        err
    )]
    pub fn return_items(
        &self,
        tenant_id: TenantId,
        agreement_id: AgreementId,
        lines: Vec<MovementLine>,
    ) -> EngineResult<Vec<StockRecordView>> {
        ensure_distinct(&lines)?;
        let agreement = self.load_agreement(tenant_id, agreement_id)?;
        let status = agreement.status();
        if !status.accepts_returns() {
            return Err(DomainError::invalid_state(format!("cannot return stock: agreement is {status}")).into());
        }

        let mut planned = Vec::with_capacity(lines.len());
        for line in lines {
            agreement_product(&agreement, &line.item.key)?;
            let key = self.pick_record(tenant_id, &agreement, line.item.key, Some(line.item.quantity))?;
            let available = self
                .read_stock(|p| p.get(tenant_id, StockRecordId::for_key(&key)))?
                .map(|r| r.balance.available)
                .unwrap_or(0);
            if available < line.item.quantity {
                return Err(DomainError::insufficient_stock(line.item.quantity, available).into());
            }
            planned.push((key, line));
        }

        let mut record_ids = Vec::with_capacity(planned.len());
        for (key, line) in planned {
            let record_id = StockRecordId::for_key(&key);
            let command = StockCommand::ReturnStock(ReturnStock {
                tenant_id,
                record_id,
                quantity: line.item.quantity,
                notes: line.notes,
                occurred_at: Utc::now(),
            });
            self.dispatch(tenant_id, record_id.0, AGGREGATE_TYPE, || Ok(command.clone()), make_stock)?;
            record_ids.push(record_id);
        }
        self.record_views(tenant_id, &record_ids)
    }

    /// Correct a record by `delta` units. A reason is mandatory; paused and
    /// terminated agreements accept adjustments.
    #[instrument(skip(self, reason), fields(tenant_id = %tenant_id, record_id = %record_id), err)]
    pub fn adjust(
        &self,
        tenant_id: TenantId,
        record_id: StockRecordId,
        delta: i64,
        reason: &str,
    ) -> EngineResult<StockRecordView> {
        let record = self.stock_record(tenant_id, record_id)?;
        // The agreement must still resolve for this tenant.
        self.load_agreement(tenant_id, record.key.agreement_id)?;

        let command = StockCommand::AdjustStock(AdjustStock {
            tenant_id,
            record_id,
            delta,
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        });
        self.dispatch(tenant_id, record_id.0, AGGREGATE_TYPE, || Ok(command.clone()), make_stock)?;
        info!(delta, "stock adjusted");
        self.record_view(tenant_id, record_id)
    }

    /// Adjust by agreement and product instead of record id.
    pub fn adjust_product(
        &self,
        tenant_id: TenantId,
        agreement_id: AgreementId,
        product: ProductKey,
        delta: i64,
        reason: &str,
    ) -> EngineResult<StockRecordView> {
        let agreement = self.load_agreement(tenant_id, agreement_id)?;
        let key = self.pick_record(tenant_id, &agreement, product, None)?;
        self.adjust(tenant_id, StockRecordId::for_key(&key), delta, reason)
    }

    pub fn stock_record(&self, tenant_id: TenantId, record_id: StockRecordId) -> EngineResult<StockRecordView> {
        self.read_stock(|p| p.get(tenant_id, record_id))?
            .ok_or_else(|| DomainError::not_found().into())
    }

    /// Balance of one product on an agreement, summed over locations. Zero
    /// for a product that never received stock.
    pub fn balance(
        &self,
        tenant_id: TenantId,
        agreement_id: AgreementId,
        product: ProductKey,
    ) -> EngineResult<StockBalance> {
        self.agreement_view(tenant_id, agreement_id)?;
        self.read_stock(|p| {
            let mut total = StockBalance::default();
            p.list(tenant_id)
                .iter()
                .filter(|r| r.key.agreement_id == agreement_id && r.key.product == product)
                .for_each(|r| total.merge(&r.balance));
            total
        })
    }

    pub fn balances_for_agreement(
        &self,
        tenant_id: TenantId,
        agreement_id: AgreementId,
        only_available: bool,
    ) -> EngineResult<Vec<StockRecordView>> {
        self.agreement_view(tenant_id, agreement_id)?;
        self.list_stock(
            tenant_id,
            StockFilter {
                agreement_id: Some(agreement_id),
                product_id: None,
                only_available,
            },
        )
    }

    pub fn list_stock(&self, tenant_id: TenantId, filter: StockFilter) -> EngineResult<Vec<StockRecordView>> {
        self.read_stock(|p| {
            p.list(tenant_id)
                .into_iter()
                .filter(|r| filter.agreement_id.is_none_or(|a| r.key.agreement_id == a))
                .filter(|r| filter.product_id.is_none_or(|id| r.key.product.product_id == id))
                .filter(|r| !filter.only_available || r.balance.available > 0)
                .collect()
        })
    }

    /// Which record a movement of `product` should hit. The record at the
    /// agreement's current location wins; records left at earlier locations
    /// are used when they can cover `needed` and the current one cannot.
    fn pick_record(
        &self,
        tenant_id: TenantId,
        agreement: &Agreement,
        product: ProductKey,
        needed: Option<i64>,
    ) -> EngineResult<StockRecordKey> {
        let agreement_id = agreement.id_typed();
        let current = StockRecordKey::new(agreement_id, product, agreement.terms().and_then(|t| t.location_id));
        let records = self.read_stock(|p| {
            p.list(tenant_id)
                .into_iter()
                .filter(|r| r.key.agreement_id == agreement_id && r.key.product == product)
                .collect::<Vec<_>>()
        })?;

        let covers = |r: &StockRecordView| needed.is_none_or(|n| r.balance.available >= n);
        let picked = records
            .iter()
            .filter(|r| covers(*r))
            .min_by_key(|r| (r.key != current, r.key))
            .or_else(|| records.iter().find(|r| r.key == current))
            .or_else(|| records.first())
            .map(|r| r.key);
        Ok(picked.unwrap_or(current))
    }

    fn record_view(&self, tenant_id: TenantId, record_id: StockRecordId) -> EngineResult<StockRecordView> {
        self.read_stock(|p| p.get(tenant_id, record_id))?
            .ok_or_else(|| EngineError::Corrupt(format!("stock record {record_id} missing from read model")))
    }

    fn record_views(&self, tenant_id: TenantId, record_ids: &[StockRecordId]) -> EngineResult<Vec<StockRecordView>> {
        record_ids.iter().map(|id| self.record_view(tenant_id, *id)).collect()
    }
}
