use thiserror::Error;

use consignment_core::DomainError;
use consignment_events::ProjectionError;
use consignment_infra::event_store::EventStoreError;
use consignment_infra::projections::CatchUpError;
use consignment_infra::DispatchError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure of an engine operation.
///
/// `Domain` errors are deterministic: retrying the same call fails the same
/// way. `Concurrency` means the retry budget ran out while other writers kept
/// winning; `Store` may be transient depending on the backend.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("concurrency conflict persisted after retries: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// Stored events no longer decode, or a read model is out of step.
    #[error("corrupt state: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

impl EngineError {
    /// Only infrastructure failures are worth retrying; callers re-run the
    /// whole operation so preconditions are validated again.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Concurrency(_) => true,
            EngineError::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DispatchError> for EngineError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(e) => EngineError::Domain(e),
            DispatchError::Concurrency(msg) => EngineError::Concurrency(msg),
            DispatchError::TenantIsolation(msg) => EngineError::TenantIsolation(msg),
            DispatchError::Deserialize(msg) => EngineError::Corrupt(msg),
            DispatchError::Store(e) => EngineError::Store(e),
        }
    }
}

impl From<ProjectionError> for EngineError {
    fn from(value: ProjectionError) -> Self {
        EngineError::Corrupt(value.to_string())
    }
}

impl From<CatchUpError> for EngineError {
    fn from(value: CatchUpError) -> Self {
        match value {
            CatchUpError::Store(e) => EngineError::Store(e),
            CatchUpError::Projection(e) => e.into(),
        }
    }
}
