//! Backoff between failed or empty assignment requests.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same interval after every failure
    Fixed(Duration),
    /// base * 2^attempt, capped at max
    Exponential { base: Duration, max: Duration },
}

/// Retry policy for the poll loop. Retries are never exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    backoff: Backoff,
    /// Upper bound of the uniform random delay added to each wait
    jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::fixed(Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn fixed(interval: Duration) -> Self {
        RetryPolicy {
            backoff: Backoff::Fixed(interval),
            jitter: Duration::ZERO,
        }
    }

    pub fn exponential(base: Duration, max: Duration) -> Self {
        RetryPolicy {
            backoff: Backoff::Exponential { base, max },
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    /// Delay before retry number `attempt` (0-indexed), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(interval) => interval,
            Backoff::Exponential { base, max } => {
                // 2^20 is far past any sane cap
                let multiplier = 2u32.pow(attempt.min(20));
                base.saturating_mul(multiplier).min(max)
            }
        }
    }

    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter.is_zero() {
            return base;
        }
        let extra = rng.gen_range(0..=self.jitter.as_millis() as u64);
        base + Duration::from_millis(extra)
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }
}
