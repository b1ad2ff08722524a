use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use consignment_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, Folio, LocationId, Money, Percentage,
    ProductKey, SupplierId, TenantId,
};
use consignment_events::Event;

use crate::lifecycle::{AgreementStatus, LifecycleEvent};

/// Stream type name used by the event store.
pub const AGGREGATE_TYPE: &str = "consignment.agreement";

pub const DEFAULT_SETTLEMENT_PERIOD_DAYS: u32 = 30;
pub const DEFAULT_RETURN_GRACE_DAYS: u32 = 60;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgreementId(pub AggregateId);

impl AgreementId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AgreementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Commercial terms of an agreement.
///
/// Changing the terms never touches liquidations already generated; they keep
/// their own commission snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementTerms {
    pub commission_pct: Percentage,
    pub settlement_period_days: u32,
    pub return_grace_days: u32,
    pub location_id: Option<LocationId>,
    pub notes: Option<String>,
}

impl AgreementTerms {
    pub fn new(commission_pct: Percentage) -> Self {
        Self {
            commission_pct,
            settlement_period_days: DEFAULT_SETTLEMENT_PERIOD_DAYS,
            return_grace_days: DEFAULT_RETURN_GRACE_DAYS,
            location_id: None,
            notes: None,
        }
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.settlement_period_days == 0 {
            return Err(DomainError::validation("settlement_period_days must be > 0"));
        }
        Ok(())
    }
}

/// Partial update of [`AgreementTerms`]; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsUpdate {
    pub commission_pct: Option<Percentage>,
    pub settlement_period_days: Option<u32>,
    pub return_grace_days: Option<u32>,
    pub location_id: Option<LocationId>,
    pub notes: Option<String>,
}

impl TermsUpdate {
    pub fn is_empty(&self) -> bool {
        self.commission_pct.is_none()
            && self.settlement_period_days.is_none()
            && self.return_grace_days.is_none()
            && self.location_id.is_none()
            && self.notes.is_none()
    }

    fn merge_into(&self, terms: &AgreementTerms) -> AgreementTerms {
        AgreementTerms {
            commission_pct: self.commission_pct.unwrap_or(terms.commission_pct),
            settlement_period_days: self
                .settlement_period_days
                .unwrap_or(terms.settlement_period_days),
            return_grace_days: self.return_grace_days.unwrap_or(terms.return_grace_days),
            location_id: self.location_id.or(terms.location_id),
            notes: self.notes.clone().or_else(|| terms.notes.clone()),
        }
    }
}

/// A product covered by the agreement, with its consignment unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementProduct {
    pub key: ProductKey,
    pub consignment_price: Money,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agreement {
    id: AgreementId,
    tenant_id: Option<TenantId>,
    folio: Option<Folio>,
    supplier_id: Option<SupplierId>,
    terms: Option<AgreementTerms>,
    status: AgreementStatus,
    products: BTreeMap<ProductKey, AgreementProduct>,
    forced_outstanding_units: Option<i64>,
    version: u64,
    created: bool,
}

impl Agreement {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: AgreementId) -> Self {
        Self {
            id,
            tenant_id: None,
            folio: None,
            supplier_id: None,
            terms: None,
            status: AgreementStatus::Draft,
            products: BTreeMap::new(),
            forced_outstanding_units: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> AgreementId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn folio(&self) -> Option<Folio> {
        self.folio
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn terms(&self) -> Option<&AgreementTerms> {
        self.terms.as_ref()
    }

    pub fn status(&self) -> AgreementStatus {
        self.status
    }

    pub fn products(&self) -> impl Iterator<Item = &AgreementProduct> {
        self.products.values()
    }

    pub fn product(&self, key: &ProductKey) -> Option<&AgreementProduct> {
        self.products.get(key)
    }

    /// Units still on hand when the agreement was force-terminated.
    pub fn forced_outstanding_units(&self) -> Option<i64> {
        self.forced_outstanding_units
    }
}

impl AggregateRoot for Agreement {
    type Id = AgreementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ---------------------------------------------------------------------------
// Commands

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAgreement {
    pub tenant_id: TenantId,
    pub agreement_id: AgreementId,
    pub folio: Folio,
    pub supplier_id: SupplierId,
    pub terms: AgreementTerms,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTerms {
    pub tenant_id: TenantId,
    pub agreement_id: AgreementId,
    pub update: TermsUpdate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddProduct {
    pub tenant_id: TenantId,
    pub agreement_id: AgreementId,
    pub key: ProductKey,
    pub consignment_price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub tenant_id: TenantId,
    pub agreement_id: AgreementId,
    pub key: ProductKey,
    pub consignment_price: Option<Money>,
    pub active: Option<bool>,
    pub occurred_at: DateTime<Utc>,
}

/// `outstanding_units` is the ledger balance for the product, read by the
/// caller right before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveProduct {
    pub tenant_id: TenantId,
    pub agreement_id: AgreementId,
    pub key: ProductKey,
    pub outstanding_units: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Lifecycle transition. `force` and `outstanding_units` only matter for
/// `Terminate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub tenant_id: TenantId,
    pub agreement_id: AgreementId,
    pub event: LifecycleEvent,
    pub force: bool,
    pub outstanding_units: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgreementCommand {
    CreateAgreement(CreateAgreement),
    UpdateTerms(UpdateTerms),
    AddProduct(AddProduct),
    UpdateProduct(UpdateProduct),
    RemoveProduct(RemoveProduct),
    Transition(Transition),
}

// ---------------------------------------------------------------------------
// Events

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementCreated {
    pub tenant_id: TenantId,
    pub agreement_id: AgreementId,
    pub folio: Folio,
    pub supplier_id: SupplierId,
    pub terms: AgreementTerms,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the full terms after the update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementTermsUpdated {
    pub tenant_id: TenantId,
    pub agreement_id: AgreementId,
    pub terms: AgreementTerms,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementProductAdded {
    pub tenant_id: TenantId,
    pub agreement_id: AgreementId,
    pub key: ProductKey,
    pub consignment_price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementProductUpdated {
    pub tenant_id: TenantId,
    pub agreement_id: AgreementId,
    pub key: ProductKey,
    pub consignment_price: Money,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementProductRemoved {
    pub tenant_id: TenantId,
    pub agreement_id: AgreementId,
    pub key: ProductKey,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementActivated {
    pub tenant_id: TenantId,
    pub agreement_id: AgreementId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementPaused {
    pub tenant_id: TenantId,
    pub agreement_id: AgreementId,
    pub occurred_at: DateTime<Utc>,
}

/// `forced` is set when termination went through with consigned units still
/// on hand; `outstanding_units` records how many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementTerminated {
    pub tenant_id: TenantId,
    pub agreement_id: AgreementId,
    pub forced: bool,
    pub outstanding_units: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgreementEvent {
    AgreementCreated(AgreementCreated),
    AgreementTermsUpdated(AgreementTermsUpdated),
    AgreementProductAdded(AgreementProductAdded),
    AgreementProductUpdated(AgreementProductUpdated),
    AgreementProductRemoved(AgreementProductRemoved),
    AgreementActivated(AgreementActivated),
    AgreementPaused(AgreementPaused),
    AgreementTerminated(AgreementTerminated),
}

impl AgreementEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            AgreementEvent::AgreementCreated(e) => e.tenant_id,
            AgreementEvent::AgreementTermsUpdated(e) => e.tenant_id,
            AgreementEvent::AgreementProductAdded(e) => e.tenant_id,
            AgreementEvent::AgreementProductUpdated(e) => e.tenant_id,
            AgreementEvent::AgreementProductRemoved(e) => e.tenant_id,
            AgreementEvent::AgreementActivated(e) => e.tenant_id,
            AgreementEvent::AgreementPaused(e) => e.tenant_id,
            AgreementEvent::AgreementTerminated(e) => e.tenant_id,
        }
    }
}

impl Event for AgreementEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AgreementEvent::AgreementCreated(_) => "consignment.agreement.created",
            AgreementEvent::AgreementTermsUpdated(_) => "consignment.agreement.terms_updated",
            AgreementEvent::AgreementProductAdded(_) => "consignment.agreement.product_added",
            AgreementEvent::AgreementProductUpdated(_) => "consignment.agreement.product_updated",
            AgreementEvent::AgreementProductRemoved(_) => "consignment.agreement.product_removed",
            AgreementEvent::AgreementActivated(_) => "consignment.agreement.activated",
            AgreementEvent::AgreementPaused(_) => "consignment.agreement.paused",
            AgreementEvent::AgreementTerminated(_) => "consignment.agreement.terminated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AgreementEvent::AgreementCreated(e) => e.occurred_at,
            AgreementEvent::AgreementTermsUpdated(e) => e.occurred_at,
            AgreementEvent::AgreementProductAdded(e) => e.occurred_at,
            AgreementEvent::AgreementProductUpdated(e) => e.occurred_at,
            AgreementEvent::AgreementProductRemoved(e) => e.occurred_at,
            AgreementEvent::AgreementActivated(e) => e.occurred_at,
            AgreementEvent::AgreementPaused(e) => e.occurred_at,
            AgreementEvent::AgreementTerminated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Agreement {
    type Command = AgreementCommand;
    type Event = AgreementEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AgreementEvent::AgreementCreated(e) => {
                self.id = e.agreement_id;
                self.tenant_id = Some(e.tenant_id);
                self.folio = Some(e.folio);
                self.supplier_id = Some(e.supplier_id);
                self.terms = Some(e.terms.clone());
                self.status = AgreementStatus::Draft;
                self.products.clear();
                self.created = true;
            }
            AgreementEvent::AgreementTermsUpdated(e) => {
                self.terms = Some(e.terms.clone());
            }
            AgreementEvent::AgreementProductAdded(e) => {
                self.products.insert(
                    e.key,
                    AgreementProduct {
                        key: e.key,
                        consignment_price: e.consignment_price,
                        active: true,
                    },
                );
            }
            AgreementEvent::AgreementProductUpdated(e) => {
                if let Some(p) = self.products.get_mut(&e.key) {
                    p.consignment_price = e.consignment_price;
                    p.active = e.active;
                }
            }
            AgreementEvent::AgreementProductRemoved(e) => {
                self.products.remove(&e.key);
            }
            AgreementEvent::AgreementActivated(_) => {
                self.status = AgreementStatus::Active;
            }
            AgreementEvent::AgreementPaused(_) => {
                self.status = AgreementStatus::Paused;
            }
            AgreementEvent::AgreementTerminated(e) => {
                self.status = AgreementStatus::Terminated;
                if e.forced {
                    self.forced_outstanding_units = Some(e.outstanding_units);
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AgreementCommand::CreateAgreement(cmd) => self.handle_create(cmd),
            AgreementCommand::UpdateTerms(cmd) => self.handle_update_terms(cmd),
            AgreementCommand::AddProduct(cmd) => self.handle_add_product(cmd),
            AgreementCommand::UpdateProduct(cmd) => self.handle_update_product(cmd),
            AgreementCommand::RemoveProduct(cmd) => self.handle_remove_product(cmd),
            AgreementCommand::Transition(cmd) => self.handle_transition(cmd),
        }
    }
}

impl Agreement {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_agreement_id(&self, agreement_id: AgreementId) -> Result<(), DomainError> {
        if self.id != agreement_id {
            return Err(DomainError::invariant("agreement_id mismatch"));
        }
        Ok(())
    }

    fn ensure_existing(&self, tenant_id: TenantId, agreement_id: AgreementId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_agreement_id(agreement_id)
    }

    fn ensure_not_terminated(&self, what: &str) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_state(format!(
                "cannot {what}: agreement is terminated"
            )));
        }
        Ok(())
    }

    fn current_terms(&self) -> Result<&AgreementTerms, DomainError> {
        self.terms
            .as_ref()
            .ok_or_else(|| DomainError::invariant("created agreement without terms"))
    }

    fn handle_create(&self, cmd: &CreateAgreement) -> Result<Vec<AgreementEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("agreement already exists"));
        }
        cmd.terms.validate()?;

        Ok(vec![AgreementEvent::AgreementCreated(AgreementCreated {
            tenant_id: cmd.tenant_id,
            agreement_id: cmd.agreement_id,
            folio: cmd.folio,
            supplier_id: cmd.supplier_id,
            terms: cmd.terms.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_terms(&self, cmd: &UpdateTerms) -> Result<Vec<AgreementEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.agreement_id)?;
        self.ensure_not_terminated("update terms")?;

        if cmd.update.is_empty() {
            return Ok(vec![]);
        }

        let terms = cmd.update.merge_into(self.current_terms()?);
        terms.validate()?;

        Ok(vec![AgreementEvent::AgreementTermsUpdated(AgreementTermsUpdated {
            tenant_id: cmd.tenant_id,
            agreement_id: cmd.agreement_id,
            terms,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_product(&self, cmd: &AddProduct) -> Result<Vec<AgreementEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.agreement_id)?;
        self.ensure_not_terminated("add products")?;

        if self.products.contains_key(&cmd.key) {
            return Err(DomainError::duplicate(format!(
                "product {} is already part of the agreement",
                cmd.key
            )));
        }
        let price = Money::price(cmd.consignment_price.amount())?;

        Ok(vec![AgreementEvent::AgreementProductAdded(AgreementProductAdded {
            tenant_id: cmd.tenant_id,
            agreement_id: cmd.agreement_id,
            key: cmd.key,
            consignment_price: price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_product(&self, cmd: &UpdateProduct) -> Result<Vec<AgreementEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.agreement_id)?;
        self.ensure_not_terminated("update products")?;

        let current = self.products.get(&cmd.key).ok_or_else(DomainError::not_found)?;
        let consignment_price = match cmd.consignment_price {
            Some(p) => Money::price(p.amount())?,
            None => current.consignment_price,
        };
        let active = cmd.active.unwrap_or(current.active);

        if consignment_price == current.consignment_price && active == current.active {
            return Ok(vec![]);
        }

        Ok(vec![AgreementEvent::AgreementProductUpdated(AgreementProductUpdated {
            tenant_id: cmd.tenant_id,
            agreement_id: cmd.agreement_id,
            key: cmd.key,
            consignment_price,
            active,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_product(&self, cmd: &RemoveProduct) -> Result<Vec<AgreementEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.agreement_id)?;
        self.ensure_not_terminated("remove products")?;

        if !self.products.contains_key(&cmd.key) {
            return Err(DomainError::not_found());
        }
        if cmd.outstanding_units != 0 {
            return Err(DomainError::conflict(format!(
                "product {} still has {} consigned units on hand",
                cmd.key, cmd.outstanding_units
            )));
        }

        Ok(vec![AgreementEvent::AgreementProductRemoved(AgreementProductRemoved {
            tenant_id: cmd.tenant_id,
            agreement_id: cmd.agreement_id,
            key: cmd.key,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition(&self, cmd: &Transition) -> Result<Vec<AgreementEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.agreement_id)?;

        let next = self.status.on(cmd.event)?;

        let event = match next {
            AgreementStatus::Active => {
                if self.status == AgreementStatus::Draft && self.products.is_empty() {
                    return Err(DomainError::invalid_state(
                        "cannot activate an agreement without products",
                    ));
                }
                AgreementEvent::AgreementActivated(AgreementActivated {
                    tenant_id: cmd.tenant_id,
                    agreement_id: cmd.agreement_id,
                    occurred_at: cmd.occurred_at,
                })
            }
            AgreementStatus::Paused => AgreementEvent::AgreementPaused(AgreementPaused {
                tenant_id: cmd.tenant_id,
                agreement_id: cmd.agreement_id,
                occurred_at: cmd.occurred_at,
            }),
            AgreementStatus::Terminated => {
                if cmd.outstanding_units < 0 {
                    return Err(DomainError::validation("outstanding_units must be >= 0"));
                }
                if cmd.outstanding_units > 0 && !cmd.force {
                    return Err(DomainError::conflict(format!(
                        "{} consigned units are still on hand; return them or force termination",
                        cmd.outstanding_units
                    )));
                }
                AgreementEvent::AgreementTerminated(AgreementTerminated {
                    tenant_id: cmd.tenant_id,
                    agreement_id: cmd.agreement_id,
                    forced: cmd.outstanding_units > 0,
                    outstanding_units: cmd.outstanding_units,
                    occurred_at: cmd.occurred_at,
                })
            }
            AgreementStatus::Draft => {
                return Err(DomainError::invariant("no transition leads back to draft"));
            }
        };

        Ok(vec![event])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consignment_core::{FolioKind, ProductId, VariantId};
    use consignment_events::execute;
    use rust_decimal_macros::dec;

    struct Fixture {
        tenant_id: TenantId,
        agreement_id: AgreementId,
        agreement: Agreement,
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn created() -> Fixture {
        let tenant_id = TenantId::new();
        let agreement_id = AgreementId::new(AggregateId::new());
        let mut agreement = Agreement::empty(agreement_id);
        let terms = AgreementTerms::new(Percentage::new(dec!(10)).unwrap());

        execute(
            &mut agreement,
            &AgreementCommand::CreateAgreement(CreateAgreement {
                tenant_id,
                agreement_id,
                folio: Folio::new(FolioKind::Agreement, 1),
                supplier_id: SupplierId::new(),
                terms,
                occurred_at: now(),
            }),
        )
        .unwrap();

        Fixture {
            tenant_id,
            agreement_id,
            agreement,
        }
    }

    fn add_product(fx: &mut Fixture, key: ProductKey, price: Money) -> Result<Vec<AgreementEvent>, DomainError> {
        execute(
            &mut fx.agreement,
            &AgreementCommand::AddProduct(AddProduct {
                tenant_id: fx.tenant_id,
                agreement_id: fx.agreement_id,
                key,
                consignment_price: price,
                occurred_at: now(),
            }),
        )
    }

    fn transition(fx: &mut Fixture, event: LifecycleEvent, force: bool, outstanding_units: i64) -> Result<Vec<AgreementEvent>, DomainError> {
        execute(
            &mut fx.agreement,
            &AgreementCommand::Transition(Transition {
                tenant_id: fx.tenant_id,
                agreement_id: fx.agreement_id,
                event,
                force,
                outstanding_units,
                occurred_at: now(),
            }),
        )
    }

    fn key() -> ProductKey {
        ProductKey::new(ProductId::new(), None)
    }

    fn active() -> (Fixture, ProductKey) {
        let mut fx = created();
        let k = key();
        add_product(&mut fx, k, Money::new(dec!(50))).unwrap();
        transition(&mut fx, LifecycleEvent::Activate, false, 0).unwrap();
        (fx, k)
    }

    #[test]
    fn create_starts_in_draft_with_default_periods() {
        let fx = created();
        assert_eq!(fx.agreement.status(), AgreementStatus::Draft);
        let terms = fx.agreement.terms().unwrap();
        assert_eq!(terms.settlement_period_days, 30);
        assert_eq!(terms.return_grace_days, 60);
        assert_eq!(fx.agreement.version(), 1);
    }

    #[test]
    fn create_twice_conflicts() {
        let fx = created();
        let err = fx
            .agreement
            .handle(&AgreementCommand::CreateAgreement(CreateAgreement {
                tenant_id: fx.tenant_id,
                agreement_id: fx.agreement_id,
                folio: Folio::new(FolioKind::Agreement, 2),
                supplier_id: SupplierId::new(),
                terms: AgreementTerms::new(Percentage::new(dec!(5)).unwrap()),
                occurred_at: now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn zero_length_settlement_period_is_rejected() {
        let agreement = Agreement::empty(AgreementId::new(AggregateId::new()));
        let mut terms = AgreementTerms::new(Percentage::new(dec!(10)).unwrap());
        terms.settlement_period_days = 0;
        let err = agreement
            .handle(&AgreementCommand::CreateAgreement(CreateAgreement {
                tenant_id: TenantId::new(),
                agreement_id: agreement.id_typed(),
                folio: Folio::new(FolioKind::Agreement, 1),
                supplier_id: SupplierId::new(),
                terms,
                occurred_at: now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn activation_requires_a_product() {
        let mut fx = created();
        let err = transition(&mut fx, LifecycleEvent::Activate, false, 0).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
        assert_eq!(fx.agreement.status(), AgreementStatus::Draft);
        assert_eq!(fx.agreement.version(), 1);
    }

    #[test]
    fn duplicate_product_variant_pair_is_rejected() {
        let mut fx = created();
        let product = ProductId::new();
        let variant = Some(VariantId::new());

        add_product(&mut fx, ProductKey::new(product, variant), Money::new(dec!(10))).unwrap();
        add_product(&mut fx, ProductKey::new(product, None), Money::new(dec!(10))).unwrap();

        let err = add_product(&mut fx, ProductKey::new(product, variant), Money::new(dec!(12))).unwrap_err();
        assert!(matches!(err, DomainError::DuplicateKey(_)));
    }

    #[test]
    fn negative_price_is_rejected() {
        let mut fx = created();
        let err = add_product(&mut fx, key(), Money::new(dec!(-1))).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn pause_and_resume() {
        let (mut fx, _) = active();
        transition(&mut fx, LifecycleEvent::Pause, false, 0).unwrap();
        assert_eq!(fx.agreement.status(), AgreementStatus::Paused);
        transition(&mut fx, LifecycleEvent::Activate, false, 0).unwrap();
        assert_eq!(fx.agreement.status(), AgreementStatus::Active);
    }

    #[test]
    fn terminate_with_stock_requires_force() {
        let (mut fx, _) = active();
        let before = fx.agreement.clone();

        let err = transition(&mut fx, LifecycleEvent::Terminate, false, 5).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(fx.agreement, before);

        let events = transition(&mut fx, LifecycleEvent::Terminate, true, 5).unwrap();
        match &events[0] {
            AgreementEvent::AgreementTerminated(e) => {
                assert!(e.forced);
                assert_eq!(e.outstanding_units, 5);
            }
            other => panic!("expected AgreementTerminated, got {other:?}"),
        }
        assert_eq!(fx.agreement.status(), AgreementStatus::Terminated);
        assert_eq!(fx.agreement.forced_outstanding_units(), Some(5));
    }

    #[test]
    fn terminate_without_stock_is_not_forced() {
        let (mut fx, _) = active();
        let events = transition(&mut fx, LifecycleEvent::Terminate, true, 0).unwrap();
        assert!(matches!(&events[0], AgreementEvent::AgreementTerminated(e) if !e.forced));
        assert_eq!(fx.agreement.forced_outstanding_units(), None);
    }

    #[test]
    fn terminated_agreement_is_frozen() {
        let (mut fx, k) = active();
        transition(&mut fx, LifecycleEvent::Terminate, false, 0).unwrap();
        let version = fx.agreement.version();

        let err = transition(&mut fx, LifecycleEvent::Activate, false, 0).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));

        let err = add_product(&mut fx, key(), Money::new(dec!(1))).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));

        let err = execute(
            &mut fx.agreement,
            &AgreementCommand::RemoveProduct(RemoveProduct {
                tenant_id: fx.tenant_id,
                agreement_id: fx.agreement_id,
                key: k,
                outstanding_units: 0,
                occurred_at: now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));

        assert_eq!(fx.agreement.version(), version);
    }

    #[test]
    fn remove_product_with_balance_conflicts() {
        let (mut fx, k) = active();
        let remove = |units| {
            AgreementCommand::RemoveProduct(RemoveProduct {
                tenant_id: fx.tenant_id,
                agreement_id: fx.agreement_id,
                key: k,
                outstanding_units: units,
                occurred_at: now(),
            })
        };

        let err = fx.agreement.handle(&remove(3)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let cmd = remove(0);
        execute(&mut fx.agreement, &cmd).unwrap();
        assert!(fx.agreement.product(&k).is_none());
    }

    #[test]
    fn update_terms_merges_and_keeps_unset_fields() {
        let (mut fx, _) = active();
        execute(
            &mut fx.agreement,
            &AgreementCommand::UpdateTerms(UpdateTerms {
                tenant_id: fx.tenant_id,
                agreement_id: fx.agreement_id,
                update: TermsUpdate {
                    commission_pct: Some(Percentage::new(dec!(12.5)).unwrap()),
                    notes: Some("renegotiated".to_string()),
                    ..TermsUpdate::default()
                },
                occurred_at: now(),
            }),
        )
        .unwrap();

        let terms = fx.agreement.terms().unwrap();
        assert_eq!(terms.commission_pct.value(), dec!(12.5));
        assert_eq!(terms.settlement_period_days, 30);
        assert_eq!(terms.notes.as_deref(), Some("renegotiated"));
    }

    #[test]
    fn update_product_changes_price_and_active_flag() {
        let (mut fx, k) = active();
        execute(
            &mut fx.agreement,
            &AgreementCommand::UpdateProduct(UpdateProduct {
                tenant_id: fx.tenant_id,
                agreement_id: fx.agreement_id,
                key: k,
                consignment_price: Some(Money::new(dec!(55))),
                active: Some(false),
                occurred_at: now(),
            }),
        )
        .unwrap();

        let product = fx.agreement.product(&k).unwrap();
        assert_eq!(product.consignment_price, Money::new(dec!(55)));
        assert!(!product.active);
    }

    #[test]
    fn commands_from_other_tenant_are_rejected() {
        let (fx, _) = active();
        let err = fx
            .agreement
            .handle(&AgreementCommand::Transition(Transition {
                tenant_id: TenantId::new(),
                agreement_id: fx.agreement_id,
                event: LifecycleEvent::Pause,
                force: false,
                outstanding_units: 0,
                occurred_at: now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn commands_on_missing_agreement_are_not_found() {
        let agreement = Agreement::empty(AgreementId::new(AggregateId::new()));
        let err = agreement
            .handle(&AgreementCommand::Transition(Transition {
                tenant_id: TenantId::new(),
                agreement_id: agreement.id_typed(),
                event: LifecycleEvent::Activate,
                force: false,
                outstanding_units: 0,
                occurred_at: now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }
}
