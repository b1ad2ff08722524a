use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use consignment_agreements::AgreementId;
use consignment_core::{
    AggregateId, DomainError, Folio, LineItem, LiquidationId, LocationId, Money, Percentage, ProductId,
    ProductKey, SaleId, SupplierId, VariantId,
};
use consignment_engine::{MovementLine, NewSale};
use consignment_settlement::{Liquidation, LiquidationItem, LiquidationStatus};
use consignment_stock::StockRecordId;

use crate::app::errors::{self, ApiResult};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateSupplierRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateAgreementRequest {
    pub supplier_id: SupplierId,
    pub commission_pct: Decimal,
    pub settlement_period_days: Option<u32>,
    pub return_grace_days: Option<u32>,
    pub location_id: Option<LocationId>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAgreementRequest {
    pub commission_pct: Option<Decimal>,
    pub settlement_period_days: Option<u32>,
    pub return_grace_days: Option<u32>,
    pub location_id: Option<LocationId>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TerminateRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddProductRequest {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub consignment_price: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub variant_id: Option<VariantId>,
    pub consignment_price: Option<Decimal>,
    pub active: Option<bool>,
}

/// `?variant_id=` on product routes.
#[derive(Debug, Default, Deserialize)]
pub struct VariantQuery {
    pub variant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MovementItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub qty: i64,
    pub notes: Option<String>,
}

impl MovementItem {
    pub fn into_line(self) -> Result<MovementLine, DomainError> {
        let item = LineItem::new(ProductKey::new(self.product_id, self.variant_id), self.qty)?;
        Ok(MovementLine {
            item,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct MovementRequest {
    pub items: Vec<MovementItem>,
}

impl MovementRequest {
    pub fn into_lines(self) -> Result<Vec<MovementLine>, DomainError> {
        self.items.into_iter().map(MovementItem::into_line).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct SellRequest {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub qty: i64,
    pub sale_ref: String,
    pub sold_at: Option<DateTime<Utc>>,
}

impl SellRequest {
    pub fn into_sale(self) -> Result<NewSale, DomainError> {
        Ok(NewSale {
            item: LineItem::new(ProductKey::new(self.product_id, self.variant_id), self.qty)?,
            sale_ref: self.sale_ref,
            sold_at: self.sold_at,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StockQuery {
    pub agreement_id: Option<String>,
    pub product_id: Option<String>,
    pub only_available: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub delta: i64,
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AgreementsQuery {
    pub status: Option<consignment_agreements::AgreementStatus>,
    pub supplier_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateLiquidationRequest {
    pub agreement_id: AgreementId,
    pub fecha_desde: NaiveDate,
    pub fecha_hasta: NaiveDate,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PayLiquidationRequest {
    pub fecha_pago: Option<NaiveDate>,
    pub metodo_pago: Option<String>,
    pub referencia_pago: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelLiquidationRequest {
    pub motivo: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LiquidationsQuery {
    pub agreement_id: Option<String>,
    pub status: Option<LiquidationStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SalesReportQuery {
    pub fecha_desde: NaiveDate,
    pub fecha_hasta: NaiveDate,
}

// -------------------------
// Response DTOs
// -------------------------

/// Liquidation as the accounting side reads it.
#[derive(Debug, Serialize)]
pub struct LiquidationResponse {
    pub id: LiquidationId,
    pub folio: Folio,
    pub agreement_id: AgreementId,
    pub fecha_desde: NaiveDate,
    pub fecha_hasta: NaiveDate,
    pub status: LiquidationStatus,
    pub items: Vec<LiquidationItem>,
    pub sale_ids: Vec<SaleId>,
    pub total_units: i64,
    pub subtotal: Money,
    pub commission_pct: Percentage,
    pub commission: Money,
    pub total_payable: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub fecha_pago: Option<NaiveDate>,
    pub metodo_pago: Option<String>,
    pub referencia_pago: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub motivo_cancelacion: Option<String>,
}

impl From<Liquidation> for LiquidationResponse {
    fn from(l: Liquidation) -> Self {
        let (fecha_pago, metodo_pago, referencia_pago) = match l.payment {
            Some(p) => (Some(p.paid_on), p.method, p.reference),
            None => (None, None, None),
        };
        Self {
            id: l.id,
            folio: l.folio,
            agreement_id: l.agreement_id,
            fecha_desde: l.period.from,
            fecha_hasta: l.period.to,
            status: l.status,
            items: l.items,
            sale_ids: l.sale_ids,
            total_units: l.totals.total_units,
            subtotal: l.totals.subtotal,
            commission_pct: l.totals.commission_pct,
            commission: l.totals.commission,
            total_payable: l.totals.total_payable,
            idempotency_key: l.idempotency_key,
            generated_at: l.generated_at,
            confirmed_at: l.confirmed_at,
            fecha_pago,
            metodo_pago,
            referencia_pago,
            cancelled_at: l.cancelled_at,
            motivo_cancelacion: l.cancel_reason,
        }
    }
}

// -------------------------
// Path and query parsing
// -------------------------

fn parse_aggregate_id(raw: &str, what: &str) -> ApiResult<AggregateId> {
    raw.parse()
        .map_err(|_| errors::domain_error_to_response(DomainError::invalid_id(format!("invalid {what} id"))))
}

pub fn parse_agreement_id(raw: &str) -> ApiResult<AgreementId> {
    parse_aggregate_id(raw, "agreement").map(AgreementId)
}

pub fn parse_record_id(raw: &str) -> ApiResult<StockRecordId> {
    parse_aggregate_id(raw, "stock record").map(StockRecordId::new)
}

pub fn parse_id<T>(raw: &str) -> ApiResult<T>
where
    T: core::str::FromStr<Err = DomainError>,
{
    raw.parse().map_err(errors::domain_error_to_response)
}

pub fn parse_opt_id<T>(raw: Option<&str>) -> ApiResult<Option<T>>
where
    T: core::str::FromStr<Err = DomainError>,
{
    raw.filter(|s| !s.is_empty()).map(|s| parse_id::<T>(s)).transpose()
}

pub fn parse_product_key(product_id: &str, variant_id: Option<&str>) -> ApiResult<ProductKey> {
    Ok(ProductKey::new(parse_id(product_id)?, parse_opt_id(variant_id)?))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn movement_items_require_positive_quantities() {
        let req: MovementRequest = serde_json::from_value(serde_json::json!({
            "items": [
                { "product_id": ProductId::new(), "qty": 3 },
                { "product_id": ProductId::new(), "qty": 0 }
            ]
        }))
        .unwrap();
        assert!(matches!(req.into_lines(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn decimals_accept_strings_and_numbers() {
        let req: AddProductRequest = serde_json::from_value(serde_json::json!({
            "product_id": ProductId::new(),
            "consignment_price": "50.00"
        }))
        .unwrap();
        assert_eq!(req.consignment_price, dec!(50.00));

        let req: CreateAgreementRequest = serde_json::from_value(serde_json::json!({
            "supplier_id": SupplierId::new(),
            "commission_pct": 10
        }))
        .unwrap();
        assert_eq!(req.commission_pct, dec!(10));
    }

    #[test]
    fn empty_optional_ids_are_absent() {
        assert_eq!(parse_opt_id::<VariantId>(Some("")).unwrap(), None);
        assert!(parse_opt_id::<VariantId>(Some("nope")).is_err());
        assert!(parse_agreement_id("not-a-uuid").is_err());
    }
}
