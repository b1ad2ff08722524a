use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::EventEnvelope;

/// A read model built from the global event log.
///
/// Projections see every stored envelope in position order and pick the
/// aggregate types they care about; anything else is ignored. Read models are
/// disposable: dropping one and replaying the log rebuilds it exactly.
///
/// Events are the source of truth. A projection that cannot decode an event it
/// claims to understand returns an error instead of skipping it, because a
/// silently wrong read model is worse than a failed query.
pub trait Projection: Send {
    fn name(&self) -> &'static str;

    fn apply(&mut self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("{projection}: cannot decode {event_type} at position {position}: {message}")]
    Decode {
        projection: &'static str,
        event_type: String,
        position: u64,
        message: String,
    },

    #[error("{projection}: inconsistent read model: {message}")]
    Inconsistent {
        projection: &'static str,
        message: String,
    },
}

/// Deserialize an envelope payload into a typed event enum.
pub fn decode_payload<T: DeserializeOwned>(
    projection: &'static str,
    envelope: &EventEnvelope<JsonValue>,
) -> Result<T, ProjectionError> {
    serde_json::from_value(envelope.payload().clone()).map_err(|e| ProjectionError::Decode {
        projection,
        event_type: envelope.event_type().to_string(),
        position: envelope.position(),
        message: e.to_string(),
    })
}
