use std::time::Duration;

/// Shared, immutable-after-construction configuration for all sessions spawned from
///  one registry (or one client). Per-session mutable state - failure counters, the
///  termination latch - lives on the session itself, never here.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// base wait interval for heartbeats, retries and read deadlines
    pub base_interval: Duration,
    /// upper bound of the uniform random offset added to every wait
    pub jitter_ceiling: Duration,
    /// max consecutive probe failures before a session is considered dead
    pub tolerance: u32,
}

impl Default for SessionConfig {
    fn default() -> SessionConfig {
        SessionConfig {
            base_interval: Duration::from_millis(500),
            jitter_ceiling: Duration::from_millis(1000),
            tolerance: 3,
        }
    }
}

impl SessionConfig {
    /// worst-case single wait, for reasoning about retry budgets
    pub fn max_wait(&self) -> Duration {
        self.base_interval + self.jitter_ceiling
    }
}
