//! `consignment-api`: the HTTP surface of the consignment engine.
//!
//! Bearer tokens carry the tenant; every route below `/health` runs inside
//! that tenant and write routes check role permissions before the engine sees
//! the command.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;
