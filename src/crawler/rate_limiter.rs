//! Request spacing with jitter
//!
//! Every outbound request reserves a dispatch instant before it leaves. The
//! reservation is made under a short-lived lock and the caller then sleeps
//! on its own, so concurrent callers queue up behind each other without any
//! lock being held across an await point.

use crate::config::SearchConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Partition key used when requests are not spaced per proxy
const GLOBAL_PARTITION: &str = "*";

/// Enforces a minimum interval between dispatches of one partition
pub struct RateLimiter {
    min_interval: Duration,
    jitter: Duration,
    state: Mutex<LimiterState>,
}

struct LimiterState {
    /// Last reserved dispatch instant per partition
    last_dispatch: HashMap<String, Instant>,
    rng: StdRng,
}

impl RateLimiter {
    /// Creates a new rate limiter
    ///
    /// # Arguments
    ///
    /// * `min_interval` - Minimum spacing between two dispatches of a partition
    /// * `jitter` - Upper bound of the uniform random delay added to each wait
    /// * `seed` - Optional RNG seed for reproducible jitter
    pub fn new(min_interval: Duration, jitter: Duration, seed: Option<u64>) -> Self {
        Self {
            min_interval,
            jitter,
            state: Mutex::new(LimiterState {
                last_dispatch: HashMap::new(),
                rng: seeded_rng(seed),
            }),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.min_interval, config.jitter, config.seed)
    }

    /// Waits until the caller may dispatch a request
    ///
    /// `partition` selects the spacing bucket (a proxy descriptor); `None`
    /// uses the single global bucket.
    ///
    /// # Returns
    ///
    /// The instant the slot was reserved for
    pub async fn acquire(&self, partition: Option<&str>) -> Instant {
        let dispatch_at = self.reserve(partition, Instant::now());
        tokio::time::sleep_until(dispatch_at).await;
        dispatch_at
    }

    /// Reserves the next dispatch instant for a partition
    ///
    /// The wait is `max(0, min_interval - elapsed) + uniform(0, jitter)`,
    /// where `elapsed` is measured from the partition's previous reservation.
    fn reserve(&self, partition: Option<&str>, now: Instant) -> Instant {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let jitter = jitter_sample(&mut state.rng, self.jitter);
        let key = partition.unwrap_or(GLOBAL_PARTITION);

        let earliest = match state.last_dispatch.get(key) {
            Some(last) => (*last + self.min_interval).max(now),
            None => now,
        };
        let dispatch_at = earliest + jitter;

        state.last_dispatch.insert(key.to_string(), dispatch_at);
        tracing::trace!(
            "Reserved slot for partition {} in {:?}",
            key,
            dispatch_at.saturating_duration_since(now)
        );
        dispatch_at
    }
}

/// Builds an RNG from a seed, or from OS entropy when no seed is given
pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Draws a uniform delay in `[0, jitter]` at millisecond resolution
pub(crate) fn jitter_sample<R: Rng>(rng: &mut R, jitter: Duration) -> Duration {
    let max_ms = jitter.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.random_range(0..=max_ms))
}
