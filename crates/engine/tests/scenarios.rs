use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use consignment_agreements::{AgreementId, AgreementStatus, LifecycleEvent};
use consignment_core::{
    DomainError, LineItem, Money, ProductId, ProductKey, SaleId, SupplierId, TenantId,
};
use consignment_engine::{
    ConsignmentEngine, EngineConfig, EngineError, GenerateRequest, LiquidationFilter, MovementLine,
    NewAgreement, NewSale, Payment, ProductChanges, RecordedSale, StockFilter,
};
use consignment_settlement::LiquidationStatus;

struct Fixture {
    engine: ConsignmentEngine,
    tenant: TenantId,
    supplier: SupplierId,
}

fn fixture() -> Fixture {
    let engine = ConsignmentEngine::in_memory(EngineConfig::default());
    let tenant = TenantId::new();
    let supplier = engine
        .suppliers()
        .register(tenant, "Taller Azul")
        .unwrap()
        .supplier_id;
    Fixture {
        engine,
        tenant,
        supplier,
    }
}

fn march(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
}

fn domain(err: EngineError) -> DomainError {
    match err {
        EngineError::Domain(e) => e,
        other => panic!("expected a domain error, got {other:?}"),
    }
}

fn product() -> ProductKey {
    ProductKey::new(ProductId::new(), None)
}

impl Fixture {
    fn draft(&self, pct: Decimal) -> AgreementId {
        self.engine
            .create_agreement(
                self.tenant,
                NewAgreement {
                    supplier_id: self.supplier,
                    commission_pct: pct,
                    settlement_period_days: None,
                    return_grace_days: None,
                    location_id: None,
                    notes: None,
                },
            )
            .unwrap()
            .agreement_id
    }

    fn active(&self, pct: Decimal, product: ProductKey, price: Decimal) -> AgreementId {
        let agreement = self.draft(pct);
        self.engine.add_product(self.tenant, agreement, product, price).unwrap();
        self.engine
            .transition(self.tenant, agreement, LifecycleEvent::Activate, false)
            .unwrap();
        agreement
    }

    fn receive(&self, agreement: AgreementId, product: ProductKey, quantity: i64) {
        self.engine
            .receive(
                self.tenant,
                agreement,
                MovementLine::new(LineItem::new(product, quantity).unwrap()),
            )
            .unwrap();
    }

    fn sell_on(
        &self,
        agreement: AgreementId,
        product: ProductKey,
        quantity: i64,
        day: NaiveDate,
    ) -> Result<RecordedSale, EngineError> {
        self.engine.sell(
            self.tenant,
            agreement,
            NewSale {
                item: LineItem::new(product, quantity).unwrap(),
                sale_ref: format!("POS-{day}-{quantity}"),
                sold_at: Some(Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap())),
            },
        )
    }

    fn generate(&self, agreement: AgreementId, from: NaiveDate, to: NaiveDate) -> Result<consignment_settlement::Liquidation, EngineError> {
        self.engine.generate(
            self.tenant,
            GenerateRequest {
                agreement_id: agreement,
                from,
                to,
                idempotency_key: None,
            },
        )
    }
}

#[test]
fn thirty_units_at_fifty_settle_and_get_paid() {
    let f = fixture();
    let item = product();
    let agreement = f.active(dec!(10), item, dec!(50));
    f.receive(agreement, item, 100);
    f.sell_on(agreement, item, 30, march(10)).unwrap();

    let draft = f.generate(agreement, march(1), march(31)).unwrap();
    assert_eq!(draft.status, LiquidationStatus::Draft);
    assert_eq!(draft.totals.subtotal, Money::new(dec!(1500.00)));
    assert_eq!(draft.totals.commission, Money::new(dec!(150.00)));
    assert_eq!(draft.totals.total_payable, Money::new(dec!(1350.00)));
    assert_eq!(draft.totals.total_units, 30);
    assert_eq!(draft.items.len(), 1);
    assert_eq!(draft.totals.subtotal.to_string(), "1500.00");

    let confirmed = f.engine.confirm(f.tenant, draft.id).unwrap();
    assert_eq!(confirmed.status, LiquidationStatus::Confirmed);

    let paid = f
        .engine
        .pay(
            f.tenant,
            draft.id,
            Payment {
                paid_on: Some(march(31)),
                method: Some("transferencia".into()),
                reference: None,
            },
        )
        .unwrap();
    assert_eq!(paid.status, LiquidationStatus::Paid);
    let payment = paid.payment.unwrap();
    assert_eq!(payment.method.as_deref(), Some("transferencia"));
    assert_eq!(payment.paid_on, march(31));

    let balance = f.engine.balance(f.tenant, agreement, item).unwrap();
    assert_eq!(balance.received, 100);
    assert_eq!(balance.sold, 30);
    assert_eq!(balance.available, 70);

    // Paid is terminal.
    let err = f.engine.cancel(f.tenant, draft.id, None).unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidTransition { .. }));
}

#[test]
fn concurrent_sells_never_oversell() {
    let f = fixture();
    let item = product();
    let agreement = f.active(dec!(10), item, dec!(50));
    f.receive(agreement, item, 100);

    let engine = Arc::new(f.engine);
    let barrier = Arc::new(Barrier::new(2));
    let tenant = f.tenant;

    let handles: Vec<_> = (0..2)
        .map(|n| {
            let engine = engine.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.sell(
                    tenant,
                    agreement,
                    NewSale {
                        item: LineItem::new(item, 60).unwrap(),
                        sale_ref: format!("POS-{n}"),
                        sold_at: None,
                    },
                )
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(Result::err).unwrap();
    assert_eq!(domain(err), DomainError::insufficient_stock(60, 40));
    assert_eq!(engine.balance(tenant, agreement, item).unwrap().available, 40);
}

#[test]
fn overlapping_periods_are_rejected() {
    let f = fixture();
    let item = product();
    let agreement = f.active(dec!(15), item, dec!(20));
    f.receive(agreement, item, 50);
    f.sell_on(agreement, item, 5, march(5)).unwrap();
    f.sell_on(agreement, item, 5, march(20)).unwrap();

    f.generate(agreement, march(1), march(15)).unwrap();
    let err = f.generate(agreement, march(10), march(25)).unwrap_err();
    assert!(matches!(domain(err), DomainError::OverlappingPeriod(_)));

    // The adjacent period is fine and picks up only the later sale.
    let second = f.generate(agreement, march(16), march(31)).unwrap();
    assert_eq!(second.totals.total_units, 5);
}

#[test]
fn concurrent_generates_never_settle_a_sale_twice() {
    let f = fixture();
    let item = product();
    let agreement = f.active(dec!(10), item, dec!(25));
    f.receive(agreement, item, 30);
    let early = f.sell_on(agreement, item, 2, march(5)).unwrap().sale_id;
    let shared = f.sell_on(agreement, item, 3, march(12)).unwrap().sale_id;
    let late = f.sell_on(agreement, item, 4, march(20)).unwrap().sale_id;

    let engine = Arc::new(f.engine);
    let barrier = Arc::new(Barrier::new(2));
    let tenant = f.tenant;
    let periods = [(march(1), march(15)), (march(10), march(25))];

    let handles: Vec<_> = periods
        .into_iter()
        .map(|(from, to)| {
            let engine = engine.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.generate(
                    tenant,
                    GenerateRequest {
                        agreement_id: agreement,
                        from,
                        to,
                        idempotency_key: None,
                    },
                )
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(domain(err), DomainError::OverlappingPeriod(_)));

    let in_force: Vec<_> = engine
        .list_liquidations(
            tenant,
            LiquidationFilter {
                agreement_id: Some(agreement),
                status: None,
            },
        )
        .unwrap()
        .into_iter()
        .filter(|l| l.status.is_in_force())
        .collect();
    assert_eq!(in_force.len(), 1);

    let claims = |sale: SaleId| {
        in_force
            .iter()
            .flat_map(|l| l.sale_ids.iter())
            .filter(|id| **id == sale)
            .count()
    };
    assert_eq!(claims(shared), 1);
    assert_eq!(claims(early) + claims(late), 1);
}

#[test]
fn cancel_then_regenerate_reproduces_totals() {
    let f = fixture();
    let shirt = product();
    let agreement = f.active(dec!(12.5), shirt, dec!(33.33));
    f.receive(agreement, shirt, 40);
    f.sell_on(agreement, shirt, 3, march(2)).unwrap();
    f.sell_on(agreement, shirt, 4, march(9)).unwrap();

    let first = f.generate(agreement, march(1), march(31)).unwrap();
    let cancelled = f
        .engine
        .cancel(f.tenant, first.id, Some("wrong period".into()))
        .unwrap();
    assert_eq!(cancelled.status, LiquidationStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("wrong period"));

    let pending = f.engine.pending_to_settle(f.tenant).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].pending_units, 7);

    let again = f.generate(agreement, march(1), march(31)).unwrap();
    assert_ne!(again.id, first.id);
    assert!(again.folio > first.folio);
    assert_eq!(again.totals, first.totals);
    assert_eq!(again.items, first.items);
    // 7 × 33.33 = 233.31; 12.5% = 29.16375 → 29.16
    assert_eq!(again.totals.commission, Money::new(dec!(29.16)));
    assert_eq!(
        again.totals.total_payable.checked_add(again.totals.commission).unwrap(),
        again.totals.subtotal
    );
    assert!(f.engine.pending_to_settle(f.tenant).unwrap().is_empty());
}

#[test]
fn folios_strictly_increase_per_kind() {
    let f = fixture();
    let folios: Vec<_> = (0..3)
        .map(|_| {
            let id = f.draft(dec!(5));
            f.engine.get_agreement(f.tenant, id).unwrap().folio
        })
        .collect();
    assert_eq!(folios[0].to_string(), "CON-000001");
    assert!(folios.windows(2).all(|w| w[0] < w[1]));

    let item = product();
    let agreement = f.active(dec!(5), item, dec!(10));
    f.receive(agreement, item, 10);
    f.sell_on(agreement, item, 1, march(1)).unwrap();
    f.sell_on(agreement, item, 1, march(2)).unwrap();
    let a = f.generate(agreement, march(1), march(1)).unwrap();
    let b = f.generate(agreement, march(2), march(2)).unwrap();
    assert_eq!(a.folio.to_string(), "LIQ-000001");
    assert!(b.folio > a.folio);
}

#[test]
fn unknown_supplier_and_bad_commission_are_validation_errors() {
    let f = fixture();
    let mut input = NewAgreement {
        supplier_id: SupplierId::new(),
        commission_pct: dec!(10),
        settlement_period_days: None,
        return_grace_days: None,
        location_id: None,
        notes: None,
    };
    let err = f.engine.create_agreement(f.tenant, input.clone()).unwrap_err();
    assert!(matches!(domain(err), DomainError::Validation(_)));

    input.supplier_id = f.supplier;
    input.commission_pct = dec!(100.01);
    let err = f.engine.create_agreement(f.tenant, input).unwrap_err();
    assert!(matches!(domain(err), DomainError::Validation(_)));
}

#[test]
fn generate_with_the_same_key_returns_the_same_liquidation() {
    let f = fixture();
    let item = product();
    let agreement = f.active(dec!(10), item, dec!(8));
    f.receive(agreement, item, 10);
    f.sell_on(agreement, item, 2, march(3)).unwrap();

    let request = GenerateRequest {
        agreement_id: agreement,
        from: march(1),
        to: march(31),
        idempotency_key: Some("march-close".into()),
    };
    let first = f.engine.generate(f.tenant, request.clone()).unwrap();
    let second = f.engine.generate(f.tenant, request).unwrap();
    assert_eq!(first.id, second.id);

    let all = f
        .engine
        .list_liquidations(f.tenant, LiquidationFilter::default())
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn empty_period_reports_no_sales() {
    let f = fixture();
    let item = product();
    let agreement = f.active(dec!(10), item, dec!(8));
    f.receive(agreement, item, 10);
    f.sell_on(agreement, item, 2, march(20)).unwrap();

    let err = f.generate(agreement, march(1), march(10)).unwrap_err();
    assert_eq!(domain(err), DomainError::NoSalesInPeriod);

    let err = f.generate(agreement, march(10), march(1)).unwrap_err();
    assert!(matches!(domain(err), DomainError::Validation(_)));
}

#[test]
fn termination_with_stock_needs_force_and_still_allows_returns() {
    let f = fixture();
    let item = product();
    let agreement = f.active(dec!(10), item, dec!(8));
    f.receive(agreement, item, 12);

    let err = f
        .engine
        .transition(f.tenant, agreement, LifecycleEvent::Terminate, false)
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::Conflict(_)));

    let view = f
        .engine
        .transition(f.tenant, agreement, LifecycleEvent::Terminate, true)
        .unwrap();
    assert_eq!(view.status, AgreementStatus::Terminated);
    assert_eq!(view.forced_outstanding_units, Some(12));

    let err = f
        .engine
        .receive(f.tenant, agreement, MovementLine::new(LineItem::new(item, 1).unwrap()))
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidState(_)));
    let err = f.sell_on(agreement, item, 1, march(1)).unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidState(_)));

    let record = f
        .engine
        .return_to_supplier(f.tenant, agreement, MovementLine::new(LineItem::new(item, 12).unwrap()))
        .unwrap();
    assert_eq!(record.balance.returned, 12);
    assert_eq!(record.balance.available, 0);

    let err = f
        .engine
        .transition(f.tenant, agreement, LifecycleEvent::Activate, false)
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidTransition { .. }));
}

#[test]
fn draft_agreements_take_no_stock_and_need_products_to_activate() {
    let f = fixture();
    let agreement = f.draft(dec!(10));

    let err = f
        .engine
        .transition(f.tenant, agreement, LifecycleEvent::Activate, false)
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidState(_)));

    let item = product();
    f.engine.add_product(f.tenant, agreement, item, dec!(5)).unwrap();
    let err = f
        .engine
        .receive(f.tenant, agreement, MovementLine::new(LineItem::new(item, 1).unwrap()))
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidState(_)));

    let err = f.engine.add_product(f.tenant, agreement, item, dec!(6)).unwrap_err();
    assert!(matches!(domain(err), DomainError::DuplicateKey(_)));
}

#[test]
fn products_with_stock_cannot_be_removed() {
    let f = fixture();
    let item = product();
    let agreement = f.active(dec!(10), item, dec!(5));
    f.receive(agreement, item, 3);

    let err = f.engine.remove_product(f.tenant, agreement, item).unwrap_err();
    assert!(matches!(domain(err), DomainError::Conflict(_)));

    f.engine
        .return_to_supplier(f.tenant, agreement, MovementLine::new(LineItem::new(item, 3).unwrap()))
        .unwrap();
    let view = f.engine.remove_product(f.tenant, agreement, item).unwrap();
    assert!(view.products.is_empty());
}

#[test]
fn inactive_products_stop_sales_but_not_returns() {
    let f = fixture();
    let item = product();
    let agreement = f.active(dec!(10), item, dec!(5));
    f.receive(agreement, item, 4);

    f.engine
        .update_product(
            f.tenant,
            agreement,
            item,
            ProductChanges {
                consignment_price: None,
                active: Some(false),
            },
        )
        .unwrap();

    let err = f.sell_on(agreement, item, 1, march(1)).unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidState(_)));
    f.engine
        .return_to_supplier(f.tenant, agreement, MovementLine::new(LineItem::new(item, 4).unwrap()))
        .unwrap();
}

#[test]
fn multi_item_return_checks_every_line_before_writing() {
    let f = fixture();
    let a = product();
    let b = product();
    let agreement = f.active(dec!(10), a, dec!(5));
    f.engine.add_product(f.tenant, agreement, b, dec!(7)).unwrap();
    f.engine
        .receive_items(
            f.tenant,
            agreement,
            vec![
                MovementLine::new(LineItem::new(a, 5).unwrap()),
                MovementLine::new(LineItem::new(b, 2).unwrap()),
            ],
        )
        .unwrap();

    let err = f
        .engine
        .return_items(
            f.tenant,
            agreement,
            vec![
                MovementLine::new(LineItem::new(a, 5).unwrap()),
                MovementLine::new(LineItem::new(b, 3).unwrap()),
            ],
        )
        .unwrap_err();
    assert_eq!(domain(err), DomainError::insufficient_stock(3, 2));
    assert_eq!(f.engine.balance(f.tenant, agreement, a).unwrap().available, 5);
}

#[test]
fn adjustments_need_a_reason_and_cannot_go_negative() {
    let f = fixture();
    let item = product();
    let agreement = f.active(dec!(10), item, dec!(5));
    f.receive(agreement, item, 10);
    let record = f
        .engine
        .balances_for_agreement(f.tenant, agreement, false)
        .unwrap()
        .remove(0);

    let err = f.engine.adjust(f.tenant, record.record_id, -2, "  ").unwrap_err();
    assert!(matches!(domain(err), DomainError::Validation(_)));

    let err = f.engine.adjust(f.tenant, record.record_id, -11, "shrinkage").unwrap_err();
    assert!(matches!(domain(err), DomainError::InsufficientStock { .. }));

    let view = f.engine.adjust(f.tenant, record.record_id, -2, "damaged in transit").unwrap();
    assert_eq!(view.balance.adjusted, -2);
    assert_eq!(view.balance.available, 8);

    f.engine
        .transition(f.tenant, agreement, LifecycleEvent::Pause, false)
        .unwrap();
    let view = f
        .engine
        .adjust_product(f.tenant, agreement, item, 1, "recount")
        .unwrap();
    assert_eq!(view.balance.available, 9);
}

#[test]
fn tenants_cannot_see_each_other() {
    let f = fixture();
    let item = product();
    let agreement = f.active(dec!(10), item, dec!(5));
    f.receive(agreement, item, 10);

    let stranger = TenantId::new();
    let err = f.engine.get_agreement(stranger, agreement).unwrap_err();
    assert_eq!(domain(err), DomainError::NotFound);
    let err = f
        .engine
        .receive(stranger, agreement, MovementLine::new(LineItem::new(item, 1).unwrap()))
        .unwrap_err();
    assert_eq!(domain(err), DomainError::NotFound);
    assert!(f.engine.list_stock(stranger, StockFilter::default()).unwrap().is_empty());
    assert!(f.engine.stock_by_supplier(stranger).unwrap().is_empty());
}

#[test]
fn reports_split_settled_and_pending_units() {
    let f = fixture();
    let item = product();
    let agreement = f.active(dec!(10), item, dec!(50));
    f.receive(agreement, item, 100);
    f.sell_on(agreement, item, 30, march(10)).unwrap();
    f.sell_on(agreement, item, 5, march(20)).unwrap();
    f.generate(agreement, march(1), march(15)).unwrap();

    let by_supplier = f.engine.stock_by_supplier(f.tenant).unwrap();
    assert_eq!(by_supplier.len(), 1);
    assert_eq!(by_supplier[0].supplier_name.as_deref(), Some("Taller Azul"));
    assert_eq!(by_supplier[0].agreements, 1);
    assert_eq!(by_supplier[0].balance.sold, 35);
    assert_eq!(by_supplier[0].balance.available, 65);

    let sales = f.engine.sales_by_product(f.tenant, march(1), march(31)).unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].units_sold, 35);
    assert_eq!(sales[0].settled_units, 30);
    assert_eq!(sales[0].pending_units, 5);

    let pending = f.engine.pending_to_settle(f.tenant).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].pending_units, 5);
    assert_eq!(pending[0].estimated_subtotal, Money::new(dec!(250.00)));
    assert_eq!(pending[0].estimated_commission, Money::new(dec!(25.00)));
    assert_eq!(pending[0].estimated_payable, Money::new(dec!(225.00)));
}

#[test]
fn stock_listing_filters_by_agreement_and_availability() {
    let f = fixture();
    let a = product();
    let b = product();
    let first = f.active(dec!(10), a, dec!(5));
    let second = f.active(dec!(10), b, dec!(5));
    f.receive(first, a, 2);
    f.receive(second, b, 2);
    f.engine
        .return_to_supplier(f.tenant, second, MovementLine::new(LineItem::new(b, 2).unwrap()))
        .unwrap();

    assert_eq!(f.engine.list_stock(f.tenant, StockFilter::default()).unwrap().len(), 2);
    let available = f
        .engine
        .list_stock(
            f.tenant,
            StockFilter {
                only_available: true,
                ..StockFilter::default()
            },
        )
        .unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].key.agreement_id, first);

    let by_product = f
        .engine
        .list_stock(
            f.tenant,
            StockFilter {
                product_id: Some(b.product_id),
                ..StockFilter::default()
            },
        )
        .unwrap();
    assert_eq!(by_product.len(), 1);
    assert_eq!(by_product[0].key.agreement_id, second);
}
