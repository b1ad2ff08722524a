//! Event primitives: the `Event` contract, stored-event envelopes, and
//! position-tracked projections over the global event log.

pub mod envelope;
pub mod event;
pub mod handler;
pub mod projection;
pub mod runner;

pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use projection::{Projection, ProjectionError, decode_payload};
pub use runner::ProjectionRunner;
