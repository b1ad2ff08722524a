use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use consignment_agreements::{
    AGGREGATE_TYPE, Agreement, AgreementEvent, AgreementId, AgreementProduct, AgreementStatus,
    AgreementTerms,
};
use consignment_core::{Aggregate, Folio, SupplierId, TenantId};
use consignment_events::{EventEnvelope, Projection, ProjectionError, decode_payload};

use crate::read_model::{InMemoryTenantStore, TenantStore};

const NAME: &str = "agreements";

/// Queryable agreement: header, terms, and products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgreementView {
    pub agreement_id: AgreementId,
    pub folio: Folio,
    pub supplier_id: SupplierId,
    pub status: AgreementStatus,
    pub terms: AgreementTerms,
    pub products: Vec<AgreementProduct>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced_outstanding_units: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored row: the agreement folded with the aggregate's own `apply`, plus
/// timestamps the aggregate does not track.
#[derive(Debug, Clone)]
pub struct AgreementRow {
    agreement: Agreement,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AgreementRow {
    fn view(&self) -> Option<AgreementView> {
        let a = &self.agreement;
        Some(AgreementView {
            agreement_id: a.id_typed(),
            folio: a.folio()?,
            supplier_id: a.supplier_id()?,
            status: a.status(),
            terms: a.terms()?.clone(),
            products: a.products().cloned().collect(),
            forced_outstanding_units: a.forced_outstanding_units(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Default)]
pub struct AgreementsProjection<S = InMemoryTenantStore<AgreementId, AgreementRow>>
where
    S: TenantStore<AgreementId, AgreementRow>,
{
    store: S,
}

impl<S> AgreementsProjection<S>
where
    S: TenantStore<AgreementId, AgreementRow>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get(&self, tenant_id: TenantId, agreement_id: AgreementId) -> Option<AgreementView> {
        self.store.get(tenant_id, &agreement_id)?.view()
    }

    /// Agreements of the tenant ordered by folio.
    pub fn list(&self, tenant_id: TenantId) -> Vec<AgreementView> {
        let mut views: Vec<_> = self
            .store
            .list(tenant_id)
            .iter()
            .filter_map(AgreementRow::view)
            .collect();
        views.sort_by_key(|v| v.folio);
        views
    }

    fn apply_event(
        &self,
        tenant_id: TenantId,
        occurred_at: DateTime<Utc>,
        event: AgreementEvent,
    ) -> Result<(), ProjectionError> {
        super::ensure_same_tenant(NAME, tenant_id, event.tenant_id())?;

        let agreement_id = match &event {
            AgreementEvent::AgreementCreated(e) => e.agreement_id,
            AgreementEvent::AgreementTermsUpdated(e) => e.agreement_id,
            AgreementEvent::AgreementProductAdded(e) => e.agreement_id,
            AgreementEvent::AgreementProductUpdated(e) => e.agreement_id,
            AgreementEvent::AgreementProductRemoved(e) => e.agreement_id,
            AgreementEvent::AgreementActivated(e) => e.agreement_id,
            AgreementEvent::AgreementPaused(e) => e.agreement_id,
            AgreementEvent::AgreementTerminated(e) => e.agreement_id,
        };

        let mut row = match (self.store.get(tenant_id, &agreement_id), &event) {
            (Some(row), _) => row,
            (None, AgreementEvent::AgreementCreated(_)) => AgreementRow {
                agreement: Agreement::empty(agreement_id),
                created_at: occurred_at,
                updated_at: occurred_at,
            },
            (None, _) => {
                return Err(ProjectionError::Inconsistent {
                    projection: NAME,
                    message: format!("event for unknown agreement {agreement_id}"),
                });
            }
        };

        row.agreement.apply(&event);
        row.updated_at = occurred_at;
        self.store.upsert(tenant_id, agreement_id, row);
        Ok(())
    }
}

impl<S> Projection for AgreementsProjection<S>
where
    S: TenantStore<AgreementId, AgreementRow>,
{
    fn name(&self) -> &'static str {
        NAME
    }

    fn apply(&mut self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }
        let event: AgreementEvent = decode_payload(NAME, envelope)?;
        self.apply_event(envelope.tenant_id(), envelope.occurred_at(), event)
    }
}
