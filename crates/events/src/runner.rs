//! Position-tracked projection runner.
//!
//! The runner owns a projection and the position of the last envelope it
//! applied, so it can resume a catch-up read from exactly where it stopped.

use serde_json::Value as JsonValue;

use crate::{EventEnvelope, Projection, ProjectionError};

#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    position: u64,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            position: 0,
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    /// Position of the last applied envelope (0 when nothing was applied).
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Apply one envelope. Envelopes at or before the current position were
    /// already seen and are skipped, so redelivery is harmless.
    ///
    /// Returns whether the envelope was applied.
    pub fn apply(&mut self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        if envelope.position() <= self.position {
            return Ok(false);
        }
        self.projection.apply(envelope)?;
        self.position = envelope.position();
        Ok(true)
    }

    /// Apply many envelopes in order; returns how many were new.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<JsonValue>>,
    ) -> Result<usize, ProjectionError> {
        let mut applied = 0;
        for env in envelopes {
            if self.apply(env)? {
                applied += 1;
            }
        }
        if applied > 0 {
            tracing::trace!(
                projection = self.projection.name(),
                applied,
                position = self.position,
                "projection advanced"
            );
        }
        Ok(applied)
    }

    /// Build a fresh projection by replaying the full history.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<JsonValue>>,
    ) -> Result<Self, ProjectionError> {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok(runner)
    }
}
