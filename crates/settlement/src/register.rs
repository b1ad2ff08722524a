use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use consignment_agreements::AgreementId;
use consignment_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, Folio, LiquidationId, Percentage, SaleId,
    TenantId,
};
use consignment_events::Event;

use crate::liquidation::{
    Liquidation, LiquidationAction, LiquidationItem, LiquidationStatus, PaymentInfo,
    SettlementPeriod,
};
use crate::math::{PricedSale, SettlementTotals, build_items, compute_totals};

pub const AGGREGATE_TYPE: &str = "consignment.settlement";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettlementRegisterId(pub AggregateId);

impl SettlementRegisterId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// Each agreement has exactly one register.
    pub fn for_agreement(agreement_id: AgreementId) -> Self {
        Self(AggregateId::derived(
            AGGREGATE_TYPE,
            &[agreement_id.0.as_uuid().as_bytes().as_slice()],
        ))
    }
}

impl core::fmt::Display for SettlementRegisterId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// All liquidations of one agreement plus the sale attachment map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRegister {
    id: SettlementRegisterId,
    tenant_id: Option<TenantId>,
    agreement_id: Option<AgreementId>,
    liquidations: BTreeMap<LiquidationId, Liquidation>,
    attachments: HashMap<SaleId, LiquidationId>,
    version: u64,
    created: bool,
}

impl SettlementRegister {
    pub fn empty(id: SettlementRegisterId) -> Self {
        Self {
            id,
            tenant_id: None,
            agreement_id: None,
            liquidations: BTreeMap::new(),
            attachments: HashMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SettlementRegisterId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn agreement_id(&self) -> Option<AgreementId> {
        self.agreement_id
    }

    pub fn liquidation(&self, id: LiquidationId) -> Option<&Liquidation> {
        self.liquidations.get(&id)
    }

    pub fn liquidations(&self) -> impl Iterator<Item = &Liquidation> {
        self.liquidations.values()
    }

    /// The in-force liquidation a sale is attached to, if any.
    pub fn attached_to(&self, sale_id: SaleId) -> Option<LiquidationId> {
        self.attachments.get(&sale_id).copied()
    }

    /// In-force liquidation generated with this idempotency key.
    pub fn by_idempotency_key(&self, key: &str) -> Option<&Liquidation> {
        self.liquidations
            .values()
            .find(|l| l.status.is_in_force() && l.idempotency_key.as_deref() == Some(key))
    }
}

impl AggregateRoot for SettlementRegister {
    type Id = SettlementRegisterId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ---------------------------------------------------------------------------
// Commands

/// Generate a draft liquidation for `period` from `candidates`.
///
/// `candidates` may include sales outside the period or already attached;
/// the register filters them against its own state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateLiquidation {
    pub tenant_id: TenantId,
    pub register_id: SettlementRegisterId,
    pub agreement_id: AgreementId,
    pub liquidation_id: LiquidationId,
    pub folio: Folio,
    pub period: SettlementPeriod,
    pub commission_pct: Percentage,
    pub candidates: Vec<PricedSale>,
    pub idempotency_key: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmLiquidation {
    pub tenant_id: TenantId,
    pub register_id: SettlementRegisterId,
    pub liquidation_id: LiquidationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayLiquidation {
    pub tenant_id: TenantId,
    pub register_id: SettlementRegisterId,
    pub liquidation_id: LiquidationId,
    pub payment: PaymentInfo,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelLiquidation {
    pub tenant_id: TenantId,
    pub register_id: SettlementRegisterId,
    pub liquidation_id: LiquidationId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementCommand {
    GenerateLiquidation(GenerateLiquidation),
    ConfirmLiquidation(ConfirmLiquidation),
    PayLiquidation(PayLiquidation),
    CancelLiquidation(CancelLiquidation),
}

// ---------------------------------------------------------------------------
// Events

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationGenerated {
    pub tenant_id: TenantId,
    pub register_id: SettlementRegisterId,
    pub agreement_id: AgreementId,
    pub liquidation_id: LiquidationId,
    pub folio: Folio,
    pub period: SettlementPeriod,
    pub items: Vec<LiquidationItem>,
    pub sale_ids: Vec<SaleId>,
    pub totals: SettlementTotals,
    pub idempotency_key: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationConfirmed {
    pub tenant_id: TenantId,
    pub register_id: SettlementRegisterId,
    pub agreement_id: AgreementId,
    pub liquidation_id: LiquidationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationPaid {
    pub tenant_id: TenantId,
    pub register_id: SettlementRegisterId,
    pub agreement_id: AgreementId,
    pub liquidation_id: LiquidationId,
    pub payment: PaymentInfo,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationCancelled {
    pub tenant_id: TenantId,
    pub register_id: SettlementRegisterId,
    pub agreement_id: AgreementId,
    pub liquidation_id: LiquidationId,
    pub released_sale_ids: Vec<SaleId>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementEvent {
    LiquidationGenerated(LiquidationGenerated),
    LiquidationConfirmed(LiquidationConfirmed),
    LiquidationPaid(LiquidationPaid),
    LiquidationCancelled(LiquidationCancelled),
}

impl Event for SettlementEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SettlementEvent::LiquidationGenerated(_) => "consignment.liquidation.generated",
            SettlementEvent::LiquidationConfirmed(_) => "consignment.liquidation.confirmed",
            SettlementEvent::LiquidationPaid(_) => "consignment.liquidation.paid",
            SettlementEvent::LiquidationCancelled(_) => "consignment.liquidation.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SettlementEvent::LiquidationGenerated(e) => e.occurred_at,
            SettlementEvent::LiquidationConfirmed(e) => e.occurred_at,
            SettlementEvent::LiquidationPaid(e) => e.occurred_at,
            SettlementEvent::LiquidationCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SettlementRegister {
    type Command = SettlementCommand;
    type Event = SettlementEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SettlementEvent::LiquidationGenerated(e) => {
                if !self.created {
                    self.id = e.register_id;
                    self.tenant_id = Some(e.tenant_id);
                    self.agreement_id = Some(e.agreement_id);
                    self.created = true;
                }
                for sale_id in &e.sale_ids {
                    self.attachments.insert(*sale_id, e.liquidation_id);
                }
                self.liquidations.insert(
                    e.liquidation_id,
                    Liquidation {
                        id: e.liquidation_id,
                        folio: e.folio,
                        agreement_id: e.agreement_id,
                        period: e.period,
                        status: LiquidationStatus::Draft,
                        items: e.items.clone(),
                        sale_ids: e.sale_ids.clone(),
                        totals: e.totals,
                        idempotency_key: e.idempotency_key.clone(),
                        generated_at: e.occurred_at,
                        confirmed_at: None,
                        payment: None,
                        cancelled_at: None,
                        cancel_reason: None,
                    },
                );
            }
            SettlementEvent::LiquidationConfirmed(e) => {
                if let Some(l) = self.liquidations.get_mut(&e.liquidation_id) {
                    l.status = LiquidationStatus::Confirmed;
                    l.confirmed_at = Some(e.occurred_at);
                }
            }
            SettlementEvent::LiquidationPaid(e) => {
                if let Some(l) = self.liquidations.get_mut(&e.liquidation_id) {
                    l.status = LiquidationStatus::Paid;
                    l.payment = Some(e.payment.clone());
                }
            }
            SettlementEvent::LiquidationCancelled(e) => {
                if let Some(l) = self.liquidations.get_mut(&e.liquidation_id) {
                    l.status = LiquidationStatus::Cancelled;
                    l.cancelled_at = Some(e.occurred_at);
                    l.cancel_reason = e.reason.clone();
                }
                let cancelled = e.liquidation_id;
                self.attachments.retain(|_, owner| *owner != cancelled);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SettlementCommand::GenerateLiquidation(cmd) => self.handle_generate(cmd),
            SettlementCommand::ConfirmLiquidation(cmd) => self.handle_confirm(cmd),
            SettlementCommand::PayLiquidation(cmd) => self.handle_pay(cmd),
            SettlementCommand::CancelLiquidation(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl SettlementRegister {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_register_id(&self, register_id: SettlementRegisterId) -> Result<(), DomainError> {
        if self.id != register_id {
            return Err(DomainError::invariant("register_id mismatch"));
        }
        Ok(())
    }

    fn existing(
        &self,
        tenant_id: TenantId,
        register_id: SettlementRegisterId,
        liquidation_id: LiquidationId,
    ) -> Result<(&Liquidation, AgreementId), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_register_id(register_id)?;
        let liquidation = self
            .liquidations
            .get(&liquidation_id)
            .ok_or_else(DomainError::not_found)?;
        Ok((liquidation, liquidation.agreement_id))
    }

    fn handle_generate(&self, cmd: &GenerateLiquidation) -> Result<Vec<SettlementEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_register_id(cmd.register_id)?;
        if SettlementRegisterId::for_agreement(cmd.agreement_id) != cmd.register_id {
            return Err(DomainError::invariant("register does not belong to agreement"));
        }
        if self.created && self.agreement_id != Some(cmd.agreement_id) {
            return Err(DomainError::invariant("agreement_id mismatch"));
        }
        if self.liquidations.contains_key(&cmd.liquidation_id) {
            return Err(DomainError::conflict("liquidation already exists"));
        }

        if let Some(key) = cmd.idempotency_key.as_deref() {
            if self.by_idempotency_key(key).is_some() {
                return Ok(vec![]);
            }
        }

        if let Some(clash) = self
            .liquidations
            .values()
            .find(|l| l.status.is_in_force() && l.period.overlaps(&cmd.period))
        {
            return Err(DomainError::overlapping(format!(
                "{} overlaps liquidation {} covering {}",
                cmd.period, clash.folio, clash.period
            )));
        }

        let mut offered = HashSet::new();
        let eligible: Vec<PricedSale> = cmd
            .candidates
            .iter()
            .filter(|s| cmd.period.contains(s.sold_on))
            .filter(|s| !self.attachments.contains_key(&s.sale_id))
            .filter(|s| offered.insert(s.sale_id))
            .cloned()
            .collect();

        if eligible.is_empty() {
            return Err(DomainError::NoSalesInPeriod);
        }

        let items = build_items(&eligible)?;
        let totals = compute_totals(&items, cmd.commission_pct)?;

        Ok(vec![SettlementEvent::LiquidationGenerated(LiquidationGenerated {
            tenant_id: cmd.tenant_id,
            register_id: cmd.register_id,
            agreement_id: cmd.agreement_id,
            liquidation_id: cmd.liquidation_id,
            folio: cmd.folio,
            period: cmd.period,
            items,
            sale_ids: eligible.iter().map(|s| s.sale_id).collect(),
            totals,
            idempotency_key: cmd.idempotency_key.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmLiquidation) -> Result<Vec<SettlementEvent>, DomainError> {
        let (liquidation, agreement_id) =
            self.existing(cmd.tenant_id, cmd.register_id, cmd.liquidation_id)?;
        liquidation.status.on(LiquidationAction::Confirm)?;

        // Items freeze here, so the figures must still add up.
        let recomputed = compute_totals(&liquidation.items, liquidation.totals.commission_pct)?;
        if recomputed != liquidation.totals {
            return Err(DomainError::invariant(format!(
                "liquidation {} totals do not match its items",
                liquidation.folio
            )));
        }
        if liquidation
            .sale_ids
            .iter()
            .any(|s| self.attachments.get(s) != Some(&liquidation.id))
        {
            return Err(DomainError::invariant(format!(
                "liquidation {} lost one of its sales",
                liquidation.folio
            )));
        }

        Ok(vec![SettlementEvent::LiquidationConfirmed(LiquidationConfirmed {
            tenant_id: cmd.tenant_id,
            register_id: cmd.register_id,
            agreement_id,
            liquidation_id: cmd.liquidation_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_pay(&self, cmd: &PayLiquidation) -> Result<Vec<SettlementEvent>, DomainError> {
        let (liquidation, agreement_id) =
            self.existing(cmd.tenant_id, cmd.register_id, cmd.liquidation_id)?;
        liquidation.status.on(LiquidationAction::Pay)?;

        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Ok(vec![SettlementEvent::LiquidationPaid(LiquidationPaid {
            tenant_id: cmd.tenant_id,
            register_id: cmd.register_id,
            agreement_id,
            liquidation_id: cmd.liquidation_id,
            payment: PaymentInfo {
                paid_on: cmd.payment.paid_on,
                method: clean(&cmd.payment.method),
                reference: clean(&cmd.payment.reference),
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelLiquidation) -> Result<Vec<SettlementEvent>, DomainError> {
        let (liquidation, agreement_id) =
            self.existing(cmd.tenant_id, cmd.register_id, cmd.liquidation_id)?;
        liquidation.status.on(LiquidationAction::Cancel)?;

        Ok(vec![SettlementEvent::LiquidationCancelled(LiquidationCancelled {
            tenant_id: cmd.tenant_id,
            register_id: cmd.register_id,
            agreement_id,
            liquidation_id: cmd.liquidation_id,
            released_sale_ids: liquidation.sale_ids.clone(),
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
