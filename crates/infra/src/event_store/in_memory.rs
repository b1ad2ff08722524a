use std::collections::HashMap;
use std::sync::RwLock;

use consignment_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Inner {
    /// Every stored event in position order; `log[i].position == i + 1`.
    log: Vec<StoredEvent>,
    /// Indexes into `log` per stream.
    streams: HashMap<StreamKey, Vec<usize>>,
}

/// In-memory append-only event store for tests and single-process use.
///
/// One write lock covers the version check and the append, so positions are
/// handed out in commit order.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> EventStoreError {
        EventStoreError::Backend("event store lock poisoned".to_string())
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        validate_batch(&events)?;

        let key = StreamKey {
            tenant_id: events[0].tenant_id,
            aggregate_id: events[0].aggregate_id,
        };
        let aggregate_type = events[0].aggregate_type.clone();

        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let Inner { log, streams } = &mut *inner;

        let stream = streams.entry(key).or_default();
        let current = stream.len() as u64;

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(&first) = stream.first() {
            let existing = &log[first].aggregate_type;
            if *existing != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
                )));
            }
        }

        let mut committed = Vec::with_capacity(events.len());
        for (offset, e) in events.into_iter().enumerate() {
            let stored = StoredEvent {
                event_id: e.event_id,
                tenant_id: e.tenant_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: current + offset as u64 + 1,
                position: log.len() as u64 + 1,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            stream.push(log.len());
            log.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;

        Ok(inner
            .streams
            .get(&key)
            .map(|idxs| idxs.iter().map(|&i| inner.log[i].clone()).collect())
            .unwrap_or_default())
    }

    fn read_all(&self, after: u64, limit: usize) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(inner.log.len());
        Ok(inner.log[start..].iter().take(limit).cloned().collect())
    }
}
