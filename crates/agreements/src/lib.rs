//! Agreement Store: consignment agreements with a supplier, the products they
//! cover, and the agreement lifecycle.
//!
//! Pure domain logic; persistence and lookups live in the engine.

pub mod agreement;
pub mod lifecycle;

pub use agreement::{
    AGGREGATE_TYPE, AddProduct, Agreement, AgreementActivated, AgreementCommand, AgreementCreated,
    AgreementEvent, AgreementId, AgreementPaused, AgreementProduct, AgreementProductAdded,
    AgreementProductRemoved, AgreementProductUpdated, AgreementTerminated, AgreementTerms,
    AgreementTermsUpdated, CreateAgreement, RemoveProduct, TermsUpdate, Transition, UpdateProduct,
    UpdateTerms,
};
pub use lifecycle::{AgreementStatus, LifecycleEvent};
