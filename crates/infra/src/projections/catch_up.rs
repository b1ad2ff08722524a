use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use consignment_events::{Projection, ProjectionError, ProjectionRunner};

use crate::event_store::{EventStore, EventStoreError};

const DEFAULT_BATCH: usize = 512;

#[derive(Debug, Error)]
pub enum CatchUpError {
    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

/// A projection that pulls from the store before every read.
///
/// `read` first applies everything past the runner's position, so a query
/// issued after a command returned always sees that command's events.
#[derive(Debug)]
pub struct CatchUp<P>
where
    P: Projection,
{
    runner: Mutex<ProjectionRunner<P>>,
    batch: usize,
}

impl<P> CatchUp<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            runner: Mutex::new(ProjectionRunner::new(projection)),
            batch: DEFAULT_BATCH,
        }
    }

    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }

    /// Catch up, then run `f` against the projection while still holding the
    /// lock.
    pub fn read<R>(&self, store: &dyn EventStore, f: impl FnOnce(&P) -> R) -> Result<R, CatchUpError> {
        let runner = self.refresh(store)?;
        Ok(f(runner.projection()))
    }

    /// Position of the last applied event.
    pub fn position(&self) -> u64 {
        self.lock().position()
    }

    fn refresh(&self, store: &dyn EventStore) -> Result<MutexGuard<'_, ProjectionRunner<P>>, CatchUpError> {
        let mut runner = self.lock();
        loop {
            let batch = store.read_all(runner.position(), self.batch)?;
            let envelopes: Vec<_> = batch.iter().map(|e| e.to_envelope()).collect();
            runner.run(&envelopes)?;
            if batch.len() < self.batch {
                return Ok(runner);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProjectionRunner<P>> {
        // Rows are replaced whole and the position only moves after a
        // successful apply, so a poisoned runner is still consistent.
        self.runner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
