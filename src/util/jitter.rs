use std::time::Duration;

use rand::RngExt;

use crate::config::SessionConfig;

/// A randomized wait duration: base interval plus a uniform offset up to the jitter
///  ceiling. Fixed-interval heartbeats from many peers would synchronise and hammer
///  the shared rendezvous socket in lockstep; jitter desynchronises them. Used for
///  every retry sleep, every per-attempt read deadline, and the heartbeat sleep.
pub fn jittered_wait(config: &SessionConfig) -> Duration {
    let ceiling_ms = config.jitter_ceiling.as_millis() as u64;
    let offset_ms = rand::rng().random_range(0..=ceiling_ms);
    config.base_interval + Duration::from_millis(offset_ms)
}
