//! Consignment Stock Ledger.
//!
//! One event-sourced record per (agreement, product, variant, location). The
//! record's event stream is the movement log: every receipt, sale, return and
//! adjustment is an appended event and the balance is derived from them.

pub mod record;

pub use record::{
    AGGREGATE_TYPE, AdjustStock, ConsignmentStock, ReceiveStock, ReturnStock, SellStock,
    StockAdjusted, StockBalance, StockCommand, StockEvent, StockReceived, StockRecordId,
    StockRecordKey, StockReturned, StockSold,
};
