use std::time::Duration;

/// Tuning knobs for the payment processor and batch coordinator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on charge attempts in flight within one batch.
    pub max_concurrency: usize,
    /// A charge that takes longer than this is recorded as a network failure.
    pub charge_timeout: Option<Duration>,
    /// `PAYING` invoices untouched for this long are retried by a `PAYING` batch.
    pub stale_paying_after: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            charge_timeout: Some(Duration::from_secs(30)),
            stale_paying_after: Duration::from_secs(15 * 60),
        }
    }
}

impl EngineConfig {
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_charge_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.charge_timeout = timeout;
        self
    }

    pub fn with_stale_paying_after(mut self, threshold: Duration) -> Self {
        self.stale_paying_after = threshold;
        self
    }
}
