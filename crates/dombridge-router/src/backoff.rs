//! Exponential backoff with jitter for the reconnect loop.

use std::time::Duration;

use rand::Rng;

/// Exponent cap; beyond this the uncapped delay would overflow anyway.
const MAX_SHIFT: u32 = 20;

/// Computes reconnect delays as `min(base * 2^attempt, max)` with up to a
/// quarter of the value subtracted as jitter, so a fleet of brokers restarted
/// together does not retry in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retry number `attempt` (zero-based). The result always
    /// lands in `[3/4 * capped, capped]` where `capped` is the jitterless
    /// exponential value.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let capped = self.capped_delay(attempt);
        let jitter_ceiling = capped / 4;
        if jitter_ceiling.is_zero() {
            return capped;
        }
        let jitter_ms = rand::rng().random_range(0..=jitter_ceiling.as_millis() as u64);
        capped - Duration::from_millis(jitter_ms)
    }

    fn capped_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.min(MAX_SHIFT);
        self.base
            .checked_mul(1u32 << shift)
            .map_or(self.max, |d| d.min(self.max))
    }
}
