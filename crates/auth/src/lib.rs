//! `consignment-auth`: who is calling and what they may do.
//!
//! No HTTP and no storage in here. The API decodes a bearer token with
//! [`Hs256JwtValidator`], turns the claims into a [`Principal`], and checks a
//! [`Permission`] before running a command.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use principal::{PrincipalId, TenantMembership};
pub use roles::Role;
