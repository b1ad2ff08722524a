use consignment_infra::RetryPolicy;

/// Tunables of a [`crate::ConsignmentEngine`]. The HTTP binary fills this from
/// its environment; tests use the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    /// Events pulled per read while a projection catches up.
    pub projection_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            projection_batch: 512,
        }
    }
}

impl EngineConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry = RetryPolicy::new(max_attempts);
        self
    }
}
