//! Command → EventStore → catch-up projection → read model.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;

    use consignment_agreements::{
        self as agreements, AddProduct, Agreement, AgreementCommand, AgreementId, AgreementStatus,
        AgreementTerms, CreateAgreement, LifecycleEvent, Transition,
    };
    use consignment_core::{
        AggregateId, Folio, FolioKind, Money, Percentage, ProductId, ProductKey, SaleId, SupplierId,
        TenantId,
    };
    use consignment_events::ProjectionRunner;
    use consignment_settlement::{
        self as settlement, CancelLiquidation, GenerateLiquidation, PricedSale, SettlementCommand,
        SettlementPeriod, SettlementRegister, SettlementRegisterId,
    };
    use consignment_stock::{
        self as stock, ConsignmentStock, ReceiveStock, SellStock, StockCommand, StockRecordId,
        StockRecordKey,
    };

    use crate::command_dispatcher::CommandDispatcher;
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::projections::{
        AgreementsProjection, CatchUp, ConsignedSalesProjection, LiquidationsProjection,
        StockBalancesProjection,
    };

    struct Harness {
        store: Arc<InMemoryEventStore>,
        dispatcher: CommandDispatcher<Arc<InMemoryEventStore>>,
        tenant_id: TenantId,
        agreement_id: AgreementId,
        key: ProductKey,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryEventStore::new());
        Harness {
            dispatcher: CommandDispatcher::new(store.clone()),
            store,
            tenant_id: TenantId::new(),
            agreement_id: AgreementId::new(AggregateId::new()),
            key: ProductKey::new(ProductId::new(), None),
        }
    }

    impl Harness {
        fn agreement(&self, command: AgreementCommand) {
            self.dispatcher
                .dispatch(
                    self.tenant_id,
                    self.agreement_id.0,
                    agreements::AGGREGATE_TYPE,
                    &command,
                    |_, id| Agreement::empty(AgreementId::new(id)),
                )
                .unwrap();
        }

        fn active_agreement(&self) {
            let now = Utc::now();
            self.agreement(AgreementCommand::CreateAgreement(CreateAgreement {
                tenant_id: self.tenant_id,
                agreement_id: self.agreement_id,
                folio: Folio::new(FolioKind::Agreement, 1),
                supplier_id: SupplierId::new(),
                terms: AgreementTerms::new(Percentage::new(dec!(10)).unwrap()),
                occurred_at: now,
            }));
            self.agreement(AgreementCommand::AddProduct(AddProduct {
                tenant_id: self.tenant_id,
                agreement_id: self.agreement_id,
                key: self.key,
                consignment_price: Money::price(dec!(50)).unwrap(),
                occurred_at: now,
            }));
            self.agreement(AgreementCommand::Transition(Transition {
                tenant_id: self.tenant_id,
                agreement_id: self.agreement_id,
                event: LifecycleEvent::Activate,
                force: false,
                outstanding_units: 0,
                occurred_at: now,
            }));
        }

        fn record_key(&self) -> StockRecordKey {
            StockRecordKey::new(self.agreement_id, self.key, None)
        }

        fn stock(&self, command: StockCommand) {
            let record_id = StockRecordId::for_key(&self.record_key());
            self.dispatcher
                .dispatch(
                    self.tenant_id,
                    record_id.0,
                    stock::AGGREGATE_TYPE,
                    &command,
                    |_, id| ConsignmentStock::empty(StockRecordId::new(id)),
                )
                .unwrap();
        }

        fn receive(&self, quantity: i64) {
            let key = self.record_key();
            self.stock(StockCommand::ReceiveStock(ReceiveStock {
                tenant_id: self.tenant_id,
                record_id: StockRecordId::for_key(&key),
                key,
                quantity,
                notes: None,
                occurred_at: Utc::now(),
            }));
        }

        fn sell(&self, quantity: i64, at: chrono::DateTime<Utc>) -> SaleId {
            let sale_id = SaleId::new();
            self.stock(StockCommand::SellStock(SellStock {
                tenant_id: self.tenant_id,
                record_id: StockRecordId::for_key(&self.record_key()),
                sale_id,
                quantity,
                sale_ref: "T-1".to_string(),
                occurred_at: at,
            }));
            sale_id
        }

        fn settlement(&self, command: SettlementCommand) {
            let register_id = SettlementRegisterId::for_agreement(self.agreement_id);
            self.dispatcher
                .dispatch(
                    self.tenant_id,
                    register_id.0,
                    settlement::AGGREGATE_TYPE,
                    &command,
                    |_, id| SettlementRegister::empty(SettlementRegisterId::new(id)),
                )
                .unwrap();
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn read_models_see_writes_immediately() {
        let h = harness();
        let agreements = CatchUp::new(<AgreementsProjection>::default());
        let balances = CatchUp::new(<StockBalancesProjection>::default());

        h.active_agreement();
        h.receive(100);
        h.sell(30, Utc::now());

        let view = agreements
            .read(h.store.as_ref(), |p| p.get(h.tenant_id, h.agreement_id))
            .unwrap()
            .unwrap();
        assert_eq!(view.status, AgreementStatus::Active);
        assert_eq!(view.products.len(), 1);

        let records = balances.read(h.store.as_ref(), |p| p.list(h.tenant_id)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].balance.received, 100);
        assert_eq!(records[0].balance.sold, 30);
        assert_eq!(records[0].balance.available, 70);
    }

    #[test]
    fn sales_are_attached_and_released_with_their_liquidation() {
        let h = harness();
        let sales = CatchUp::new(<ConsignedSalesProjection>::default());
        let liquidations = CatchUp::new(<LiquidationsProjection>::default());

        h.active_agreement();
        h.receive(10);
        let sold_at = Utc.from_utc_datetime(&day(5).and_hms_opt(12, 0, 0).unwrap());
        let sale_id = h.sell(4, sold_at);

        let liquidation_id = consignment_core::LiquidationId::new();
        h.settlement(SettlementCommand::GenerateLiquidation(GenerateLiquidation {
            tenant_id: h.tenant_id,
            register_id: SettlementRegisterId::for_agreement(h.agreement_id),
            agreement_id: h.agreement_id,
            liquidation_id,
            folio: Folio::new(FolioKind::Liquidation, 1),
            period: SettlementPeriod::new(day(1), day(30)).unwrap(),
            commission_pct: Percentage::new(dec!(10)).unwrap(),
            candidates: vec![PricedSale {
                sale_id,
                key: h.key,
                quantity: 4,
                sold_on: day(5),
                unit_price: Some(Money::new(dec!(50))),
            }],
            idempotency_key: None,
            occurred_at: Utc::now(),
        }));

        let sale = sales.read(h.store.as_ref(), |p| p.get(h.tenant_id, sale_id)).unwrap().unwrap();
        assert_eq!(sale.liquidation_id, Some(liquidation_id));
        let liquidation = liquidations
            .read(h.store.as_ref(), |p| p.get(h.tenant_id, liquidation_id))
            .unwrap()
            .unwrap();
        assert_eq!(liquidation.totals.subtotal.amount(), dec!(200.00));

        h.settlement(SettlementCommand::CancelLiquidation(CancelLiquidation {
            tenant_id: h.tenant_id,
            register_id: SettlementRegisterId::for_agreement(h.agreement_id),
            liquidation_id,
            reason: None,
            occurred_at: Utc::now() + Duration::seconds(1),
        }));
        let sale = sales.read(h.store.as_ref(), |p| p.get(h.tenant_id, sale_id)).unwrap().unwrap();
        assert!(!sale.is_settled());
    }

    #[test]
    fn other_tenants_see_nothing() {
        let h = harness();
        let agreements = CatchUp::new(<AgreementsProjection>::default());
        h.active_agreement();

        let others = agreements
            .read(h.store.as_ref(), |p| p.list(TenantId::new()))
            .unwrap();
        assert!(others.is_empty());
    }

    #[test]
    fn rebuilding_from_scratch_matches_the_live_model() {
        let h = harness();
        let live = CatchUp::new(<StockBalancesProjection>::default()).with_batch(2);
        h.active_agreement();
        h.receive(50);
        h.sell(5, Utc::now());
        h.sell(7, Utc::now());

        let live_view = live.read(h.store.as_ref(), |p| p.list(h.tenant_id)).unwrap();

        let envelopes: Vec<_> = h
            .store
            .read_all(0, usize::MAX)
            .unwrap()
            .iter()
            .map(|e| e.to_envelope())
            .collect();
        let rebuilt =
            ProjectionRunner::rebuild_from_scratch(<StockBalancesProjection>::default, &envelopes).unwrap();

        assert_eq!(rebuilt.projection().list(h.tenant_id), live_view);
        assert_eq!(rebuilt.position(), live.position());
    }
}
