//! `consignment-engine`: the application layer of consignment management.
//!
//! [`ConsignmentEngine`] is the single entry point. Commands are validated
//! against the current agreement, decided by the aggregates, and appended
//! through the dispatcher with optimistic retry; queries are served from read
//! models that catch up with the event log before every read, so a caller
//! always sees its own writes.
//!
//! Every operation takes the tenant id explicitly; nothing crosses tenants.

pub mod agreements;
pub mod config;
pub mod engine;
pub mod error;
pub mod reporting;
pub mod settlement;
pub mod stock;
pub mod suppliers;

pub use agreements::{AgreementChanges, AgreementFilter, NewAgreement, ProductChanges};
pub use config::EngineConfig;
pub use engine::ConsignmentEngine;
pub use error::{EngineError, EngineResult};
pub use reporting::{PendingSettlementReport, ProductSalesReport, SupplierStockReport};
pub use settlement::{GenerateRequest, LiquidationFilter, Payment};
pub use stock::{MovementLine, NewSale, RecordedSale, StockFilter};
pub use suppliers::{InMemorySupplierDirectory, Supplier, SupplierDirectory};

pub use consignment_infra::projections::{AgreementView, StockRecordView};
