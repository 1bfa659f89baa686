use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Time source for every suspension point in a run.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            sleep(duration);
        }
    }
}

/// Minimum spacing between writes to one remote service.
///
/// `wait` is called after a write completes, so the first item of a run is
/// never delayed. Only the part of the interval that has not already elapsed
/// since the previous write is slept.
#[derive(Debug)]
pub struct RateLimiter<C: Clock> {
    interval: Duration,
    clock: C,
    last_write_at: Option<Instant>,
    total_waited: Duration,
}

impl<C: Clock> RateLimiter<C> {
    pub fn new(interval: Duration, clock: C) -> Self {
        Self {
            interval,
            clock,
            last_write_at: None,
            total_waited: Duration::ZERO,
        }
    }

    pub fn total_waited(&self) -> Duration {
        self.total_waited
    }

    pub fn wait(&mut self) {
        let now = self.clock.now();
        let already_elapsed = self
            .last_write_at
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or(Duration::ZERO);
        let remaining = self.interval.saturating_sub(already_elapsed);
        if !remaining.is_zero() {
            self.clock.sleep(remaining);
            self.total_waited += remaining;
        }
        self.last_write_at = Some(self.clock.now());
    }
}

/// Retry delay for throttled or transiently failing writes. Retries are
/// unbounded; the delay escalates by `factor` per attempt up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: u32,
    pub max: Duration,
    pub jitter: Duration,
}

impl BackoffPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base: delay,
            factor: 1,
            max: delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.max(1).saturating_pow(attempt);
        let escalated = self.base.saturating_mul(multiplier).min(self.max.max(self.base));
        escalated.saturating_add(self.jitter_sample())
    }

    fn jitter_sample(&self) -> Duration {
        let bound = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if bound == 0 {
            return Duration::ZERO;
        }
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_nanos()))
            .unwrap_or(0);
        Duration::from_millis(seed % bound.saturating_add(1))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(60))
    }
}
