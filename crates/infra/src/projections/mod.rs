//! Read models over the global event log.
//!
//! Every projection sees every envelope in position order, keeps what it
//! understands and ignores the rest. They are disposable: a fresh instance
//! replayed from position 0 ends up identical.

pub mod agreements;
pub mod catch_up;
pub mod consigned_sales;
pub mod liquidations;
pub mod stock_balances;

pub use agreements::{AgreementView, AgreementsProjection};
pub use catch_up::{CatchUp, CatchUpError};
pub use consigned_sales::{ConsignedSaleView, ConsignedSalesProjection};
pub use liquidations::LiquidationsProjection;
pub use stock_balances::{StockBalancesProjection, StockRecordView};

use consignment_core::TenantId;
use consignment_events::ProjectionError;

/// An event whose payload names another tenant than its envelope.
pub(crate) fn ensure_same_tenant(
    projection: &'static str,
    envelope_tenant: TenantId,
    event_tenant: TenantId,
) -> Result<(), ProjectionError> {
    if envelope_tenant != event_tenant {
        return Err(ProjectionError::Inconsistent {
            projection,
            message: "event tenant_id does not match envelope tenant_id".to_string(),
        });
    }
    Ok(())
}
