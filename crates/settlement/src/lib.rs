//! Settlement Engine: liquidations of consigned sales.
//!
//! All liquidations of one agreement live in a single event-sourced
//! [`SettlementRegister`], together with the map of which sale is attached to
//! which liquidation. Generating a liquidation and attaching its sales is
//! therefore one append to one stream, and two liquidations can never claim
//! the same sale.

pub mod liquidation;
pub mod math;
pub mod register;

pub use liquidation::{
    Liquidation, LiquidationAction, LiquidationItem, LiquidationStatus, PaymentInfo,
    SettlementPeriod,
};
pub use math::{PricedSale, SettlementTotals, build_items, compute_totals};
pub use register::{
    AGGREGATE_TYPE, CancelLiquidation, ConfirmLiquidation, GenerateLiquidation,
    LiquidationCancelled, LiquidationConfirmed, LiquidationGenerated, LiquidationPaid,
    PayLiquidation, SettlementCommand, SettlementEvent, SettlementRegister, SettlementRegisterId,
};
