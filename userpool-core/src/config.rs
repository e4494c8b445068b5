use std::time::Duration;

/// Default age after which a held lease may be reclaimed
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default period of the reclaimer sweep
pub const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of find-and-lock rounds before acquire gives up
pub const DEFAULT_MAX_ACQUIRE_ATTEMPTS: u32 = 8;

/// Tunables of the lease pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub lease_timeout: Duration,
    pub reclaim_interval: Duration,
    pub max_acquire_attempts: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
            reclaim_interval: DEFAULT_RECLAIM_INTERVAL,
            max_acquire_attempts: DEFAULT_MAX_ACQUIRE_ATTEMPTS,
        }
    }
}

impl PoolConfig {
    pub fn with_lease_timeout(mut self, lease_timeout: Duration) -> Self {
        self.lease_timeout = lease_timeout;
        self
    }

    pub fn with_reclaim_interval(mut self, reclaim_interval: Duration) -> Self {
        self.reclaim_interval = reclaim_interval;
        self
    }

    pub fn with_max_acquire_attempts(mut self, attempts: u32) -> Self {
        self.max_acquire_attempts = attempts.max(1);
        self
    }

    pub fn lease_timeout_ms(&self) -> u64 {
        self.lease_timeout.as_millis() as u64
    }
}
