//! `consignment-core`: domain primitives shared by every consignment context.
//!
//! Nothing in here performs IO: identifiers, the error taxonomy, the aggregate
//! traits, and the fixed-point money types.

pub mod aggregate;
pub mod error;
pub mod folio;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use folio::{Folio, FolioKind};
pub use id::{
    AggregateId, LiquidationId, LocationId, ProductId, SaleId, SupplierId, TenantId, UserId,
    VariantId,
};
pub use money::{Money, Percentage};
pub use value_object::{LineItem, ProductKey, ValueObject};
