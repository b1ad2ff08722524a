//! Agreement Store operations.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use consignment_agreements::{
    AGGREGATE_TYPE, AddProduct, Agreement, AgreementCommand, AgreementId, AgreementStatus,
    AgreementTerms, CreateAgreement, LifecycleEvent, RemoveProduct, TermsUpdate, Transition,
    UpdateProduct, UpdateTerms,
};
use consignment_core::{
    AggregateId, DomainError, FolioKind, LocationId, Money, Percentage, ProductKey, SupplierId,
    TenantId,
};
use consignment_infra::projections::AgreementView;

use crate::engine::ConsignmentEngine;
use crate::error::EngineResult;

/// Input of [`ConsignmentEngine::create_agreement`]. Omitted periods take the
/// agreement defaults (30 settlement days, 60 grace days).
#[derive(Debug, Clone)]
pub struct NewAgreement {
    pub supplier_id: SupplierId,
    pub commission_pct: Decimal,
    pub settlement_period_days: Option<u32>,
    pub return_grace_days: Option<u32>,
    pub location_id: Option<LocationId>,
    pub notes: Option<String>,
}

/// Partial update of an agreement's terms; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct AgreementChanges {
    pub commission_pct: Option<Decimal>,
    pub settlement_period_days: Option<u32>,
    pub return_grace_days: Option<u32>,
    pub location_id: Option<LocationId>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProductChanges {
    pub consignment_price: Option<Decimal>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AgreementFilter {
    pub status: Option<AgreementStatus>,
    pub supplier_id: Option<SupplierId>,
}

fn make_agreement(_: TenantId, id: AggregateId) -> Agreement {
    Agreement::empty(AgreementId::new(id))
}

impl ConsignmentEngine {
    #[instrument(
        skip(self, input),
        fields(tenant_id = %tenant_id, supplier_id = %input.supplier_id),
        err
    )]
    pub fn create_agreement(&self, tenant_id: TenantId, input: NewAgreement) -> EngineResult<AgreementView> {
        if !self.suppliers().exists(tenant_id, input.supplier_id) {
            return Err(DomainError::validation(format!("unknown supplier {}", input.supplier_id)).into());
        }

        let mut terms = AgreementTerms::new(Percentage::new(input.commission_pct)?);
        if let Some(days) = input.settlement_period_days {
            terms.settlement_period_days = days;
        }
        if let Some(days) = input.return_grace_days {
            terms.return_grace_days = days;
        }
        terms.location_id = input.location_id;
        terms.notes = input.notes;

        let folio = self.next_folio(tenant_id, FolioKind::Agreement)?;
        let agreement_id = AgreementId::new(AggregateId::new());
        let command = AgreementCommand::CreateAgreement(CreateAgreement {
            tenant_id,
            agreement_id,
            folio,
            supplier_id: input.supplier_id,
            terms,
            occurred_at: Utc::now(),
        });

        self.dispatch(
            tenant_id,
            agreement_id.0,
            AGGREGATE_TYPE,
            || Ok(command.clone()),
            make_agreement,
        )?;
        info!(%agreement_id, %folio, "agreement created");
        self.agreement_view(tenant_id, agreement_id)
    }

    #[instrument(
        skip(self, changes),
        fields(tenant_id = %tenant_id, agreement_id = %agreement_id),
        err
    )]
    pub fn update_agreement(
        &self,
        tenant_id: TenantId,
        agreement_id: AgreementId,
        changes: AgreementChanges,
    ) -> EngineResult<AgreementView> {
        let update = TermsUpdate {
            commission_pct: changes.commission_pct.map(Percentage::new).transpose()?,
            settlement_period_days: changes.settlement_period_days,
            return_grace_days: changes.return_grace_days,
            location_id: changes.location_id,
            notes: changes.notes,
        };
        let command = AgreementCommand::UpdateTerms(UpdateTerms {
            tenant_id,
            agreement_id,
            update,
            occurred_at: Utc::now(),
        });
        self.dispatch(tenant_id, agreement_id.0, AGGREGATE_TYPE, || Ok(command.clone()), make_agreement)?;
        self.agreement_view(tenant_id, agreement_id)
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, agreement_id = %agreement_id, product = %key),
        err
    )]
    pub fn add_product(
        &self,
        tenant_id: TenantId,
        agreement_id: AgreementId,
        key: ProductKey,
        consignment_price: Decimal,
    ) -> EngineResult<AgreementView> {
        let command = AgreementCommand::AddProduct(AddProduct {
            tenant_id,
            agreement_id,
            key,
            consignment_price: Money::price(consignment_price)?,
            occurred_at: Utc::now(),
        });
        self.dispatch(tenant_id, agreement_id.0, AGGREGATE_TYPE, || Ok(command.clone()), make_agreement)?;
        self.agreement_view(tenant_id, agreement_id)
    }

    #[instrument(
        skip(self, changes),
        fields(tenant_id = %tenant_id, agreement_id = %agreement_id, product = %key),
        err
    )]
    pub fn update_product(
        &self,
        tenant_id: TenantId,
        agreement_id: AgreementId,
        key: ProductKey,
        changes: ProductChanges,
    ) -> EngineResult<AgreementView> {
        let command = AgreementCommand::UpdateProduct(UpdateProduct {
            tenant_id,
            agreement_id,
            key,
            consignment_price: changes.consignment_price.map(Money::price).transpose()?,
            active: changes.active,
            occurred_at: Utc::now(),
        });
        self.dispatch(tenant_id, agreement_id.0, AGGREGATE_TYPE, || Ok(command.clone()), make_agreement)?;
        self.agreement_view(tenant_id, agreement_id)
    }

    /// Remove a product from the agreement. Rejected with `Conflict` while the
    /// ledger still holds available units of it at any location.
    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, agreement_id = %agreement_id, product = %key),
        err
    )]
    pub fn remove_product(
        &self,
        tenant_id: TenantId,
        agreement_id: AgreementId,
        key: ProductKey,
    ) -> EngineResult<AgreementView> {
        self.dispatch(
            tenant_id,
            agreement_id.0,
            AGGREGATE_TYPE,
            || {
                let outstanding_units = self.outstanding_units(tenant_id, agreement_id, Some(key))?;
                Ok(AgreementCommand::RemoveProduct(RemoveProduct {
                    tenant_id,
                    agreement_id,
                    key,
                    outstanding_units,
                    occurred_at: Utc::now(),
                }))
            },
            make_agreement,
        )?;
        self.agreement_view(tenant_id, agreement_id)
    }

    /// Apply a lifecycle event. Terminating with available stock needs
    /// `force`; a forced termination is recorded and logged, not blocked.
    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, agreement_id = %agreement_id, event = %event),
        err
    )]
    pub fn transition(
        &self,
        tenant_id: TenantId,
        agreement_id: AgreementId,
        event: LifecycleEvent,
        force: bool,
    ) -> EngineResult<AgreementView> {
        let dispatched = self.dispatch(
            tenant_id,
            agreement_id.0,
            AGGREGATE_TYPE,
            || {
                let outstanding_units = match event {
                    LifecycleEvent::Terminate => self.outstanding_units(tenant_id, agreement_id, None)?,
                    LifecycleEvent::Activate | LifecycleEvent::Pause => 0,
                };
                Ok(AgreementCommand::Transition(Transition {
                    tenant_id,
                    agreement_id,
                    event,
                    force,
                    outstanding_units,
                    occurred_at: Utc::now(),
                }))
            },
            make_agreement,
        )?;

        let forced_units = match event {
            LifecycleEvent::Terminate => dispatched.aggregate.forced_outstanding_units(),
            LifecycleEvent::Activate | LifecycleEvent::Pause => None,
        };
        if let Some(units) = forced_units {
            warn!(
                %agreement_id,
                outstanding_units = units,
                "agreement terminated by force with consigned stock still available"
            );
        }
        self.agreement_view(tenant_id, agreement_id)
    }

    pub fn get_agreement(&self, tenant_id: TenantId, agreement_id: AgreementId) -> EngineResult<AgreementView> {
        self.agreement_view(tenant_id, agreement_id)
    }

    pub fn list_agreements(&self, tenant_id: TenantId, filter: AgreementFilter) -> EngineResult<Vec<AgreementView>> {
        let all = self.read_agreements(|p| p.list(tenant_id))?;
        Ok(all
            .into_iter()
            .filter(|a| filter.status.is_none_or(|s| a.status == s))
            .filter(|a| filter.supplier_id.is_none_or(|s| a.supplier_id == s))
            .collect())
    }

    /// Available units across the agreement's stock records, optionally
    /// narrowed to one product key.
    pub(crate) fn outstanding_units(
        &self,
        tenant_id: TenantId,
        agreement_id: AgreementId,
        product: Option<ProductKey>,
    ) -> EngineResult<i64> {
        self.read_stock(|p| {
            p.list(tenant_id)
                .iter()
                .filter(|r| r.key.agreement_id == agreement_id)
                .filter(|r| product.is_none_or(|k| r.key.product == k))
                .map(|r| r.balance.available)
                .fold(0i64, i64::saturating_add)
        })
    }
}
