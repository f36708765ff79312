//! Pacing policies: poll backoff and dispatch retry delays.

use std::time::Duration;

use rand::Rng;

/// Multiplicative backoff for status polling.
///
/// Yields the configured initial delay first, then scales by the
/// multiplier up to the cap. Never resets; a tracker lives exactly as
/// long as one execution.
#[derive(Debug)]
pub struct PollBackoff {
    next: Duration,
    multiplier: f64,
    cap: Duration,
}

impl PollBackoff {
    pub fn new(initial: Duration, multiplier: f64, cap: Duration) -> Self {
        Self {
            next: initial,
            multiplier,
            cap,
        }
    }

    /// The delay to sleep before the next poll.
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next;
        let scaled = Duration::from_secs_f64(self.next.as_secs_f64() * self.multiplier);
        self.next = scaled.min(self.cap);
        current
    }
}

/// Delay before dispatch retry number `attempt` (zero-based): the base
/// doubled per attempt, plus up to half that again of random jitter so
/// throttled peers do not retry in lockstep.
pub fn dispatch_delay(base: Duration, attempt: u32) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
    let jitter = rand::rng().random_range(0.0..0.5);
    exponential + Duration::from_secs_f64(exponential.as_secs_f64() * jitter)
}
