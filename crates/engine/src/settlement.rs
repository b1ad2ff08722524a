//! Settlement Engine operations.
//!
//! Each agreement has one settlement register stream, so generating a
//! liquidation, checking its period against the others, and attaching its
//! sales happen in a single append.

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument};

use consignment_agreements::AgreementId;
use consignment_core::{AggregateId, DomainError, FolioKind, LiquidationId, TenantId};
use consignment_settlement::{
    AGGREGATE_TYPE, CancelLiquidation, ConfirmLiquidation, GenerateLiquidation, Liquidation,
    LiquidationStatus, PayLiquidation, PaymentInfo, PricedSale, SettlementCommand, SettlementPeriod,
    SettlementRegister, SettlementRegisterId,
};

use crate::engine::ConsignmentEngine;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub agreement_id: AgreementId,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Repeating a key returns the liquidation it already produced.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Payment {
    /// Today (UTC) when omitted.
    pub paid_on: Option<NaiveDate>,
    pub method: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LiquidationFilter {
    pub agreement_id: Option<AgreementId>,
    pub status: Option<LiquidationStatus>,
}

fn make_register(_: TenantId, id: AggregateId) -> SettlementRegister {
    SettlementRegister::empty(SettlementRegisterId::new(id))
}

impl ConsignmentEngine {
    /// Draft a liquidation of every unsettled sale of the agreement dated in
    /// `[from, to]`, priced at the agreement's current consignment prices and
    /// commission.
    #[instrument(
        skip(self, request),
        fields(tenant_id = %tenant_id, agreement_id = %request.agreement_id, from = %request.from, to = %request.to),
        err
    )]
    pub fn generate(&self, tenant_id: TenantId, request: GenerateRequest) -> EngineResult<Liquidation> {
        let agreement_id = request.agreement_id;
        let period = SettlementPeriod::new(request.from, request.to)?;
        let idempotency_key = request
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        self.load_agreement(tenant_id, agreement_id)?;
        if let Some(key) = idempotency_key.as_deref() {
            if let Some(existing) = self.liquidation_by_key(tenant_id, agreement_id, key)? {
                info!(folio = %existing.folio, "idempotent replay of liquidation");
                return Ok(existing);
            }
        }

        let register_id = SettlementRegisterId::for_agreement(agreement_id);
        let liquidation_id = LiquidationId::new();
        let folio = self.next_folio(tenant_id, FolioKind::Liquidation)?;

        let dispatched = self.dispatch(
            tenant_id,
            register_id.0,
            AGGREGATE_TYPE,
            || {
                let agreement = self.load_agreement(tenant_id, agreement_id)?;
                let terms = agreement
                    .terms()
                    .ok_or_else(|| EngineError::Corrupt(format!("agreement {agreement_id} has no terms")))?;
                let candidates = self
                    .read_sales(|p| p.for_agreement(tenant_id, agreement_id))?
                    .into_iter()
                    .filter(|s| !s.is_settled())
                    .map(|s| PricedSale {
                        sale_id: s.sale_id,
                        key: s.product,
                        quantity: s.quantity,
                        sold_on: s.sold_at.date_naive(),
                        unit_price: agreement.product(&s.product).map(|p| p.consignment_price),
                    })
                    .collect();

                Ok(SettlementCommand::GenerateLiquidation(GenerateLiquidation {
                    tenant_id,
                    register_id,
                    agreement_id,
                    liquidation_id,
                    folio,
                    period,
                    commission_pct: terms.commission_pct,
                    candidates,
                    idempotency_key: idempotency_key.clone(),
                    occurred_at: Utc::now(),
                }))
            },
            make_register,
        )?;

        let register = dispatched.aggregate;
        let liquidation = match idempotency_key.as_deref() {
            // A concurrent call with the same key won the append.
            Some(key) if dispatched.committed.is_empty() => register.by_idempotency_key(key),
            _ => register.liquidation(liquidation_id),
        }
        .cloned()
        .ok_or_else(|| EngineError::Corrupt(format!("liquidation {liquidation_id} missing after generate")))?;

        info!(
            folio = %liquidation.folio,
            units = liquidation.totals.total_units,
            subtotal = %liquidation.totals.subtotal,
            payable = %liquidation.totals.total_payable,
            "liquidation generated"
        );
        Ok(liquidation)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, liquidation_id = %liquidation_id), err)]
    pub fn confirm(&self, tenant_id: TenantId, liquidation_id: LiquidationId) -> EngineResult<Liquidation> {
        self.update_liquidation(tenant_id, liquidation_id, |register_id| {
            SettlementCommand::ConfirmLiquidation(ConfirmLiquidation {
                tenant_id,
                register_id,
                liquidation_id,
                occurred_at: Utc::now(),
            })
        })
    }

    /// Record that the supplier was paid. Irreversible.
    #[instrument(skip(self, payment), fields(tenant_id = %tenant_id, liquidation_id = %liquidation_id), err)]
    pub fn pay(&self, tenant_id: TenantId, liquidation_id: LiquidationId, payment: Payment) -> EngineResult<Liquidation> {
        let payment = PaymentInfo {
            paid_on: payment.paid_on.unwrap_or_else(|| Utc::now().date_naive()),
            method: payment.method,
            reference: payment.reference,
        };
        self.update_liquidation(tenant_id, liquidation_id, |register_id| {
            SettlementCommand::PayLiquidation(PayLiquidation {
                tenant_id,
                register_id,
                liquidation_id,
                payment: payment.clone(),
                occurred_at: Utc::now(),
            })
        })
    }

    /// Cancel a draft or confirmed liquidation; its sales become pending
    /// again.
    #[instrument(skip(self, reason), fields(tenant_id = %tenant_id, liquidation_id = %liquidation_id), err)]
    pub fn cancel(
        &self,
        tenant_id: TenantId,
        liquidation_id: LiquidationId,
        reason: Option<String>,
    ) -> EngineResult<Liquidation> {
        self.update_liquidation(tenant_id, liquidation_id, |register_id| {
            SettlementCommand::CancelLiquidation(CancelLiquidation {
                tenant_id,
                register_id,
                liquidation_id,
                reason: reason.clone(),
                occurred_at: Utc::now(),
            })
        })
    }

    pub fn get_liquidation(&self, tenant_id: TenantId, liquidation_id: LiquidationId) -> EngineResult<Liquidation> {
        self.read_liquidations(|p| p.get(tenant_id, liquidation_id))?
            .ok_or_else(|| DomainError::not_found().into())
    }

    /// Liquidations ordered by folio.
    pub fn list_liquidations(&self, tenant_id: TenantId, filter: LiquidationFilter) -> EngineResult<Vec<Liquidation>> {
        let all = self.read_liquidations(|p| match filter.agreement_id {
            Some(agreement_id) => p.for_agreement(tenant_id, agreement_id),
            None => p.list(tenant_id),
        })?;
        Ok(all
            .into_iter()
            .filter(|l| filter.status.is_none_or(|s| l.status == s))
            .collect())
    }

    fn liquidation_by_key(
        &self,
        tenant_id: TenantId,
        agreement_id: AgreementId,
        key: &str,
    ) -> EngineResult<Option<Liquidation>> {
        self.read_liquidations(|p| {
            p.for_agreement(tenant_id, agreement_id)
                .into_iter()
                .find(|l| l.status.is_in_force() && l.idempotency_key.as_deref() == Some(key))
        })
    }

    fn update_liquidation(
        &self,
        tenant_id: TenantId,
        liquidation_id: LiquidationId,
        command: impl Fn(SettlementRegisterId) -> SettlementCommand,
    ) -> EngineResult<Liquidation> {
        let agreement_id = self.get_liquidation(tenant_id, liquidation_id)?.agreement_id;
        let register_id = SettlementRegisterId::for_agreement(agreement_id);

        let dispatched = self.dispatch(
            tenant_id,
            register_id.0,
            AGGREGATE_TYPE,
            || Ok(command(register_id)),
            make_register,
        )?;
        let liquidation = dispatched
            .aggregate
            .liquidation(liquidation_id)
            .cloned()
            .ok_or_else(|| EngineError::Corrupt(format!("liquidation {liquidation_id} vanished")))?;
        info!(folio = %liquidation.folio, status = %liquidation.status, "liquidation updated");
        Ok(liquidation)
    }
}
