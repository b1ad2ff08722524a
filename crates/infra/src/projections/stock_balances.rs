use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use consignment_core::{Aggregate, TenantId};
use consignment_events::{EventEnvelope, Projection, ProjectionError, decode_payload};
use consignment_stock::{
    AGGREGATE_TYPE, ConsignmentStock, StockBalance, StockEvent, StockRecordId, StockRecordKey,
};

use crate::read_model::{InMemoryTenantStore, TenantStore};

const NAME: &str = "stock_balances";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockRecordView {
    pub record_id: StockRecordId,
    #[serde(flatten)]
    pub key: StockRecordKey,
    #[serde(flatten)]
    pub balance: StockBalance,
    pub last_movement_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StockRow {
    record: ConsignmentStock,
    last_movement_at: DateTime<Utc>,
}

impl StockRow {
    fn view(&self) -> Option<StockRecordView> {
        Some(StockRecordView {
            record_id: self.record.id_typed(),
            key: *self.record.key()?,
            balance: self.record.balance(),
            last_movement_at: self.last_movement_at,
        })
    }
}

/// Balance per stock record, folded with the ledger's own `apply`.
#[derive(Debug, Default)]
pub struct StockBalancesProjection<S = InMemoryTenantStore<StockRecordId, StockRow>>
where
    S: TenantStore<StockRecordId, StockRow>,
{
    store: S,
}

impl<S> StockBalancesProjection<S>
where
    S: TenantStore<StockRecordId, StockRow>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get(&self, tenant_id: TenantId, record_id: StockRecordId) -> Option<StockRecordView> {
        self.store.get(tenant_id, &record_id)?.view()
    }

    /// Records of the tenant ordered by key.
    pub fn list(&self, tenant_id: TenantId) -> Vec<StockRecordView> {
        let mut views: Vec<_> = self.store.list(tenant_id).iter().filter_map(StockRow::view).collect();
        views.sort_by_key(|v| v.key);
        views
    }

    fn apply_event(
        &self,
        tenant_id: TenantId,
        record_id: StockRecordId,
        event: StockEvent,
    ) -> Result<(), ProjectionError> {
        super::ensure_same_tenant(NAME, tenant_id, event.tenant_id())?;

        let occurred_at = match &event {
            StockEvent::StockReceived(e) => e.occurred_at,
            StockEvent::StockSold(e) => e.occurred_at,
            StockEvent::StockReturned(e) => e.occurred_at,
            StockEvent::StockAdjusted(e) => e.occurred_at,
        };

        let mut row = match (self.store.get(tenant_id, &record_id), &event) {
            (Some(row), _) => row,
            (None, StockEvent::StockReceived(_)) => StockRow {
                record: ConsignmentStock::empty(record_id),
                last_movement_at: occurred_at,
            },
            (None, _) => {
                return Err(ProjectionError::Inconsistent {
                    projection: NAME,
                    message: format!("movement for unknown stock record {record_id}"),
                });
            }
        };

        row.record.apply(&event);
        row.last_movement_at = row.last_movement_at.max(occurred_at);
        self.store.upsert(tenant_id, record_id, row);
        Ok(())
    }
}

impl<S> Projection for StockBalancesProjection<S>
where
    S: TenantStore<StockRecordId, StockRow>,
{
    fn name(&self) -> &'static str {
        NAME
    }

    fn apply(&mut self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }
        let event: StockEvent = decode_payload(NAME, envelope)?;
        let record_id = StockRecordId::new(envelope.aggregate_id());
        self.apply_event(envelope.tenant_id(), record_id, event)
    }
}
