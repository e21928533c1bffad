//! Wait schedules for throttled sends and consistency polling.

use std::time::Duration;

use rand::Rng;

/// `initial * factor^attempt`, capped at `ceiling`, then stretched by a random
/// share of up to `jitter` of itself (the stretch is capped too).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    initial: Duration,
    ceiling: Duration,
    factor: u32,
    jitter: f64,
}

impl RetryPolicy {
    /// Doubling schedule without jitter.
    pub const fn new(initial: Duration, ceiling: Duration) -> Self {
        Self {
            initial,
            ceiling,
            factor: 2,
            jitter: 0.0,
        }
    }

    /// Schedule for HTTP 429 answers: 1s doubling up to a minute.
    pub fn throttle() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60)).with_jitter_ratio(0.5)
    }

    /// Schedule for re-reading an ingesting dataset: 100ms doubling up to 10s.
    pub fn polling() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(10)).with_jitter_ratio(0.5)
    }

    pub fn with_factor(mut self, factor: u32) -> Self {
        self.factor = if factor == 0 { 1 } else { factor };
        self
    }

    /// Ratios outside `0.0..=1.0` are clamped; NaN disables jitter.
    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter = if ratio.is_nan() {
            0.0
        } else {
            ratio.clamp(0.0, 1.0)
        };
        self
    }

    /// Wait before retry `attempt` (zero-based) with jitter left out.
    pub fn nominal(&self, attempt: u32) -> Duration {
        let scale = self.factor.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(scale).min(self.ceiling)
    }

    /// Wait before retry `attempt`. A server-provided `hint` (`Retry-After`)
    /// is waited in full on top of the schedule.
    pub fn wait(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        self.wait_with_rng(attempt, hint, &mut rand::thread_rng())
    }

    pub fn wait_with_rng<R: Rng + ?Sized>(
        &self,
        attempt: u32,
        hint: Option<Duration>,
        rng: &mut R,
    ) -> Duration {
        let nominal = self.nominal(attempt);
        let stretch = if self.jitter > 0.0 {
            nominal.mul_f64(rng.gen_range(0.0..=self.jitter))
        } else {
            Duration::ZERO
        };
        let scheduled = nominal.saturating_add(stretch).min(self.ceiling);
        hint.unwrap_or_default().saturating_add(scheduled)
    }
}
