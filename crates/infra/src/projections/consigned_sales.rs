use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use consignment_agreements::AgreementId;
use consignment_core::{LiquidationId, LocationId, ProductKey, SaleId, TenantId};
use consignment_events::{EventEnvelope, Projection, ProjectionError, decode_payload};
use consignment_settlement::SettlementEvent;
use consignment_stock::{StockEvent, StockRecordId};

use crate::read_model::{InMemoryTenantStore, TenantStore};

const NAME: &str = "consigned_sales";

/// One consigned sale and the liquidation currently claiming it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsignedSaleView {
    pub sale_id: SaleId,
    pub record_id: StockRecordId,
    pub agreement_id: AgreementId,
    #[serde(flatten)]
    pub product: ProductKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<LocationId>,
    pub quantity: i64,
    pub sale_ref: String,
    pub sold_at: DateTime<Utc>,
    pub liquidation_id: Option<LiquidationId>,
}

impl ConsignedSaleView {
    pub fn is_settled(&self) -> bool {
        self.liquidation_id.is_some()
    }
}

/// Sales from the stock ledger joined with attachments from the settlement
/// registers. Fed by two aggregate types, so it relies on position order: a
/// liquidation can only be generated after the sales it claims were stored.
#[derive(Debug, Default)]
pub struct ConsignedSalesProjection<S = InMemoryTenantStore<SaleId, ConsignedSaleView>>
where
    S: TenantStore<SaleId, ConsignedSaleView>,
{
    store: S,
}

impl<S> ConsignedSalesProjection<S>
where
    S: TenantStore<SaleId, ConsignedSaleView>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get(&self, tenant_id: TenantId, sale_id: SaleId) -> Option<ConsignedSaleView> {
        self.store.get(tenant_id, &sale_id)
    }

    /// Sales of one agreement ordered by sale time.
    pub fn for_agreement(&self, tenant_id: TenantId, agreement_id: AgreementId) -> Vec<ConsignedSaleView> {
        let mut sales: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|s| s.agreement_id == agreement_id)
            .collect();
        sales.sort_by_key(|s| (s.sold_at, s.sale_id));
        sales
    }

    /// All sales of the tenant ordered by sale time.
    pub fn list(&self, tenant_id: TenantId) -> Vec<ConsignedSaleView> {
        let mut sales = self.store.list(tenant_id);
        sales.sort_by_key(|s| (s.sold_at, s.sale_id));
        sales
    }

    fn set_liquidation(
        &self,
        tenant_id: TenantId,
        sale_ids: &[SaleId],
        expected: Option<LiquidationId>,
        next: Option<LiquidationId>,
    ) -> Result<(), ProjectionError> {
        for sale_id in sale_ids {
            let Some(mut sale) = self.store.get(tenant_id, sale_id) else {
                return Err(ProjectionError::Inconsistent {
                    projection: NAME,
                    message: format!("liquidation references unknown sale {sale_id}"),
                });
            };
            if sale.liquidation_id != expected {
                return Err(ProjectionError::Inconsistent {
                    projection: NAME,
                    message: format!("sale {sale_id} attachment is out of step"),
                });
            }
            sale.liquidation_id = next;
            self.store.upsert(tenant_id, *sale_id, sale);
        }
        Ok(())
    }
}

impl<S> Projection for ConsignedSalesProjection<S>
where
    S: TenantStore<SaleId, ConsignedSaleView>,
{
    fn name(&self) -> &'static str {
        NAME
    }

    fn apply(&mut self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        match envelope.aggregate_type() {
            consignment_stock::AGGREGATE_TYPE => {
                let StockEvent::StockSold(e) = decode_payload::<StockEvent>(NAME, envelope)? else {
                    return Ok(());
                };
                super::ensure_same_tenant(NAME, tenant_id, e.tenant_id)?;
                self.store.upsert(
                    tenant_id,
                    e.sale_id,
                    ConsignedSaleView {
                        sale_id: e.sale_id,
                        record_id: e.record_id,
                        agreement_id: e.key.agreement_id,
                        product: e.key.product,
                        location_id: e.key.location_id,
                        quantity: e.quantity,
                        sale_ref: e.sale_ref,
                        sold_at: e.occurred_at,
                        liquidation_id: None,
                    },
                );
                Ok(())
            }
            consignment_settlement::AGGREGATE_TYPE => match decode_payload::<SettlementEvent>(NAME, envelope)? {
                SettlementEvent::LiquidationGenerated(e) => {
                    super::ensure_same_tenant(NAME, tenant_id, e.tenant_id)?;
                    self.set_liquidation(tenant_id, &e.sale_ids, None, Some(e.liquidation_id))
                }
                SettlementEvent::LiquidationCancelled(e) => {
                    super::ensure_same_tenant(NAME, tenant_id, e.tenant_id)?;
                    self.set_liquidation(
                        tenant_id,
                        &e.released_sale_ids,
                        Some(e.liquidation_id),
                        None,
                    )
                }
                SettlementEvent::LiquidationConfirmed(_) | SettlementEvent::LiquidationPaid(_) => Ok(()),
            },
            _ => Ok(()),
        }
    }
}
