//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the stream (tenant-scoped) and check it is well formed
//!   ↓
//! 2. Rehydrate the aggregate by applying history
//!   ↓
//! 3. Decide events (pure)
//!   ↓
//! 4. Append with `ExpectedVersion::Exact(loaded revision)`
//! ```
//!
//! A concurrent writer on the same stream makes step 4 fail with
//! `DispatchError::Concurrency`; `dispatch_with_retry` reloads and decides
//! again. Read models catch up from the store's global log, so there is no
//! publish step.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use consignment_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The command was rejected by the aggregate.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The stream moved between load and append.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// The store returned events that belong to another tenant or stream.
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// A stored payload no longer decodes into the aggregate's event type.
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl DispatchError {
    pub fn is_concurrency(&self) -> bool {
        matches!(self, DispatchError::Concurrency(_))
    }
}

/// Outcome of a successful dispatch.
#[derive(Debug)]
pub struct Dispatched<A> {
    /// The aggregate with the committed events applied.
    pub aggregate: A,
    /// Empty when the command decided no events.
    pub committed: Vec<StoredEvent>,
}

/// How often a command is re-decided after losing a concurrency race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> CommandDispatcher<S>
where
    S: EventStore,
{
    /// Rehydrate an aggregate without dispatching anything.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Load, decide, append. One attempt.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: consignment_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history(&mut aggregate, &history)?;

        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(Dispatched {
                aggregate,
                committed: vec![],
            });
        }

        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(tenant_id, aggregate_id, aggregate_type, Uuid::now_v7(), ev)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;
        for ev in &decided {
            aggregate.apply(ev);
        }

        Ok(Dispatched {
            aggregate,
            committed,
        })
    }

    /// Dispatch, rebuilding the command and retrying on concurrency conflicts.
    ///
    /// `build` runs once per attempt so callers can refresh inputs that depend
    /// on read models; its error type is the caller's. Anything other than a
    /// concurrency conflict is returned immediately.
    pub fn dispatch_with_retry<A, E>(
        &self,
        policy: RetryPolicy,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        mut build: impl FnMut() -> Result<A::Command, E>,
        make_aggregate: impl Fn(TenantId, AggregateId) -> A,
    ) -> Result<Dispatched<A>, E>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: consignment_events::Event + Serialize + DeserializeOwned,
        E: From<DispatchError>,
    {
        let mut attempt = 1;
        loop {
            let command = build()?;
            match self.dispatch(tenant_id, aggregate_id, aggregate_type, &command, &make_aggregate) {
                Ok(dispatched) => return Ok(dispatched),
                Err(err) if err.is_concurrency() && attempt < policy.max_attempts => {
                    debug!(
                        %aggregate_id,
                        aggregate_type,
                        attempt,
                        error = %err,
                        "concurrency conflict, retrying"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "gap or reordering in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone()).map_err(|e| {
            DispatchError::Deserialize(format!("{} #{}: {e}", stored.event_type, stored.sequence_number))
        })?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;
    use consignment_agreements::{
        AGGREGATE_TYPE, Agreement, AgreementCommand, AgreementId, AgreementTerms, CreateAgreement,
    };
    use consignment_core::{Folio, FolioKind, Percentage, SupplierId};
    use rust_decimal_macros::dec;

    use crate::event_store::InMemoryEventStore;

    fn create(tenant_id: TenantId, agreement_id: AgreementId) -> AgreementCommand {
        AgreementCommand::CreateAgreement(CreateAgreement {
            tenant_id,
            agreement_id,
            folio: Folio::new(FolioKind::Agreement, 1),
            supplier_id: SupplierId::new(),
            terms: AgreementTerms::new(Percentage::new(dec!(10)).unwrap()),
            occurred_at: Utc::now(),
        })
    }

    fn make(_: TenantId, id: AggregateId) -> Agreement {
        Agreement::empty(AgreementId::new(id))
    }

    #[test]
    fn dispatch_appends_and_returns_the_evolved_aggregate() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let tenant = TenantId::new();
        let id = AggregateId::new();

        let out = dispatcher
            .dispatch(tenant, id, AGGREGATE_TYPE, &create(tenant, AgreementId::new(id)), make)
            .unwrap();
        assert_eq!(out.committed.len(), 1);
        assert_eq!(out.committed[0].sequence_number, 1);
        assert!(out.aggregate.is_created());

        let reloaded: Agreement = dispatcher.load(tenant, id, make).unwrap();
        assert_eq!(reloaded.folio(), out.aggregate.folio());
    }

    #[test]
    fn domain_errors_are_not_retried() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let tenant = TenantId::new();
        let id = AggregateId::new();
        dispatcher
            .dispatch(tenant, id, AGGREGATE_TYPE, &create(tenant, AgreementId::new(id)), make)
            .unwrap();

        let builds = AtomicU32::new(0);
        let err = dispatcher
            .dispatch_with_retry(
                RetryPolicy::default(),
                tenant,
                id,
                AGGREGATE_TYPE,
                || {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, DispatchError>(create(tenant, AgreementId::new(id)))
                },
                make,
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::Domain(_)));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    /// Store that reports a conflict on the first `n` appends.
    struct Flaky {
        inner: InMemoryEventStore,
        conflicts_left: AtomicU32,
    }

    impl EventStore for Flaky {
        fn append(
            &self,
            events: Vec<UncommittedEvent>,
            expected_version: ExpectedVersion,
        ) -> Result<Vec<StoredEvent>, EventStoreError> {
            if self
                .conflicts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(EventStoreError::Concurrency("simulated".to_string()));
            }
            self.inner.append(events, expected_version)
        }

        fn load_stream(
            &self,
            tenant_id: TenantId,
            aggregate_id: AggregateId,
        ) -> Result<Vec<StoredEvent>, EventStoreError> {
            self.inner.load_stream(tenant_id, aggregate_id)
        }

        fn read_all(&self, after: u64, limit: usize) -> Result<Vec<StoredEvent>, EventStoreError> {
            self.inner.read_all(after, limit)
        }
    }

    #[test]
    fn concurrency_conflicts_are_retried_until_the_budget_runs_out() {
        let store = Arc::new(Flaky {
            inner: InMemoryEventStore::new(),
            conflicts_left: AtomicU32::new(2),
        });
        let dispatcher = CommandDispatcher::new(store.clone());
        let tenant = TenantId::new();
        let id = AggregateId::new();

        let out = dispatcher
            .dispatch_with_retry(
                RetryPolicy::new(3),
                tenant,
                id,
                AGGREGATE_TYPE,
                || Ok::<_, DispatchError>(create(tenant, AgreementId::new(id))),
                make,
            )
            .unwrap();
        assert_eq!(out.committed.len(), 1);

        store.conflicts_left.store(5, Ordering::SeqCst);
        let other = AggregateId::new();
        let err = dispatcher
            .dispatch_with_retry(
                RetryPolicy::new(2),
                tenant,
                other,
                AGGREGATE_TYPE,
                || Ok::<_, DispatchError>(create(tenant, AgreementId::new(other))),
                make,
            )
            .unwrap_err();
        assert!(err.is_concurrency());
    }
}
