//! The engine facade: one handle that owns the event store, the command
//! dispatcher, the folio counters, and the catch-up read models.
//!
//! Operations live in sibling modules (`agreements`, `stock`, `settlement`,
//! `reporting`) as further `impl ConsignmentEngine` blocks.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use consignment_agreements::{Agreement, AgreementId};
use consignment_core::{Aggregate, AggregateId, DomainError, Folio, FolioKind, TenantId};
use consignment_events::Event;
use consignment_infra::projections::{
    AgreementView, AgreementsProjection, CatchUp, ConsignedSalesProjection, LiquidationsProjection,
    StockBalancesProjection,
};
use consignment_infra::{
    CommandDispatcher, Dispatched, EventStore, FolioSequencer, InMemoryEventStore,
    InMemoryFolioSequencer,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::suppliers::{InMemorySupplierDirectory, SupplierDirectory};

pub struct ConsignmentEngine {
    store: Arc<dyn EventStore>,
    dispatcher: CommandDispatcher<Arc<dyn EventStore>>,
    folios: Arc<dyn FolioSequencer>,
    suppliers: Arc<dyn SupplierDirectory>,
    config: EngineConfig,
    agreements: CatchUp<AgreementsProjection>,
    stock: CatchUp<StockBalancesProjection>,
    sales: CatchUp<ConsignedSalesProjection>,
    liquidations: CatchUp<LiquidationsProjection>,
}

impl core::fmt::Debug for ConsignmentEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConsignmentEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConsignmentEngine {
    pub fn new(
        store: Arc<dyn EventStore>,
        folios: Arc<dyn FolioSequencer>,
        suppliers: Arc<dyn SupplierDirectory>,
        config: EngineConfig,
    ) -> Self {
        let batch = config.projection_batch;
        Self {
            dispatcher: CommandDispatcher::new(store.clone()),
            store,
            folios,
            suppliers,
            config,
            agreements: CatchUp::new(<AgreementsProjection>::default()).with_batch(batch),
            stock: CatchUp::new(<StockBalancesProjection>::default()).with_batch(batch),
            sales: CatchUp::new(<ConsignedSalesProjection>::default()).with_batch(batch),
            liquidations: CatchUp::new(<LiquidationsProjection>::default()).with_batch(batch),
        }
    }

    /// Everything in memory: for tests and local runs.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryFolioSequencer::new()),
            Arc::new(InMemorySupplierDirectory::new()),
            config,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn suppliers(&self) -> &dyn SupplierDirectory {
        self.suppliers.as_ref()
    }

    pub fn event_store(&self) -> &dyn EventStore {
        self.store.as_ref()
    }

    pub(crate) fn next_folio(&self, tenant_id: TenantId, kind: FolioKind) -> EngineResult<Folio> {
        Ok(self.folios.next(tenant_id, kind)?)
    }

    /// Run a command against one stream with the configured retry policy.
    pub(crate) fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        build: impl FnMut() -> EngineResult<A::Command>,
        make: impl Fn(TenantId, AggregateId) -> A,
    ) -> EngineResult<Dispatched<A>>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        self.dispatcher
            .dispatch_with_retry(self.config.retry, tenant_id, aggregate_id, aggregate_type, build, make)
    }

    /// Rehydrate an agreement from its stream. `NotFound` if it was never
    /// created for this tenant.
    pub(crate) fn load_agreement(&self, tenant_id: TenantId, agreement_id: AgreementId) -> EngineResult<Agreement> {
        let agreement = self
            .dispatcher
            .load(tenant_id, agreement_id.0, |_, id| Agreement::empty(AgreementId::new(id)))
            .map_err(EngineError::from)?;
        if !agreement.is_created() {
            return Err(DomainError::not_found().into());
        }
        Ok(agreement)
    }

    pub(crate) fn agreement_view(&self, tenant_id: TenantId, agreement_id: AgreementId) -> EngineResult<AgreementView> {
        self.read_agreements(|p| p.get(tenant_id, agreement_id))?
            .ok_or_else(|| DomainError::not_found().into())
    }

    pub(crate) fn read_agreements<R>(&self, f: impl FnOnce(&AgreementsProjection) -> R) -> EngineResult<R> {
        Ok(self.agreements.read(self.store.as_ref(), f)?)
    }

    pub(crate) fn read_stock<R>(&self, f: impl FnOnce(&StockBalancesProjection) -> R) -> EngineResult<R> {
        Ok(self.stock.read(self.store.as_ref(), f)?)
    }

    pub(crate) fn read_sales<R>(&self, f: impl FnOnce(&ConsignedSalesProjection) -> R) -> EngineResult<R> {
        Ok(self.sales.read(self.store.as_ref(), f)?)
    }

    pub(crate) fn read_liquidations<R>(&self, f: impl FnOnce(&LiquidationsProjection) -> R) -> EngineResult<R> {
        Ok(self.liquidations.read(self.store.as_ref(), f)?)
    }
}
