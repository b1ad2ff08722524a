use serde_json::Value as JsonValue;

use consignment_agreements::AgreementId;
use consignment_core::{Aggregate, LiquidationId, TenantId};
use consignment_events::{EventEnvelope, Projection, ProjectionError, decode_payload};
use consignment_settlement::{
    AGGREGATE_TYPE, Liquidation, SettlementEvent, SettlementRegister, SettlementRegisterId,
};

use crate::read_model::{InMemoryTenantStore, TenantStore};

const NAME: &str = "liquidations";

/// Every liquidation of the tenant, kept as one folded register per
/// agreement.
#[derive(Debug, Default)]
pub struct LiquidationsProjection<S = InMemoryTenantStore<SettlementRegisterId, SettlementRegister>>
where
    S: TenantStore<SettlementRegisterId, SettlementRegister>,
{
    store: S,
}

impl<S> LiquidationsProjection<S>
where
    S: TenantStore<SettlementRegisterId, SettlementRegister>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get(&self, tenant_id: TenantId, liquidation_id: LiquidationId) -> Option<Liquidation> {
        self.store
            .list(tenant_id)
            .iter()
            .find_map(|r| r.liquidation(liquidation_id).cloned())
    }

    pub fn for_agreement(&self, tenant_id: TenantId, agreement_id: AgreementId) -> Vec<Liquidation> {
        let register_id = SettlementRegisterId::for_agreement(agreement_id);
        let mut out: Vec<_> = self
            .store
            .get(tenant_id, &register_id)
            .map(|r| r.liquidations().cloned().collect())
            .unwrap_or_default();
        out.sort_by_key(|l| l.folio);
        out
    }

    /// All liquidations of the tenant ordered by folio.
    pub fn list(&self, tenant_id: TenantId) -> Vec<Liquidation> {
        let mut out: Vec<_> = self
            .store
            .list(tenant_id)
            .iter()
            .flat_map(|r| r.liquidations().cloned().collect::<Vec<_>>())
            .collect();
        out.sort_by_key(|l| l.folio);
        out
    }
}

impl<S> Projection for LiquidationsProjection<S>
where
    S: TenantStore<SettlementRegisterId, SettlementRegister>,
{
    fn name(&self) -> &'static str {
        NAME
    }

    fn apply(&mut self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }
        let event: SettlementEvent = decode_payload(NAME, envelope)?;
        let (event_tenant, register_id) = match &event {
            SettlementEvent::LiquidationGenerated(e) => (e.tenant_id, e.register_id),
            SettlementEvent::LiquidationConfirmed(e) => (e.tenant_id, e.register_id),
            SettlementEvent::LiquidationPaid(e) => (e.tenant_id, e.register_id),
            SettlementEvent::LiquidationCancelled(e) => (e.tenant_id, e.register_id),
        };
        let tenant_id = envelope.tenant_id();
        super::ensure_same_tenant(NAME, tenant_id, event_tenant)?;

        let mut register = self
            .store
            .get(tenant_id, &register_id)
            .unwrap_or_else(|| SettlementRegister::empty(register_id));
        register.apply(&event);
        self.store.upsert(tenant_id, register_id, register);
        Ok(())
    }
}
