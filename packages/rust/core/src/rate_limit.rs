//! Fixed-interval throttle for classification oracle calls.

use std::time::{Duration, Instant};

use tracing::info;

/// Block until `min_interval` has elapsed since `last_call`, then return the new call time.
///
/// `None` means no previous call, so there is no wait.
pub fn throttle(last_call: Option<Instant>, min_interval: Duration) -> Instant {
    if let Some(last) = last_call {
        let elapsed = last.elapsed();
        if elapsed < min_interval {
            let wait = min_interval - elapsed;
            info!(wait_secs = wait.as_secs_f64(), "rate limiting before next oracle call");
            std::thread::sleep(wait);
        }
    }
    Instant::now()
}

/// Remembers the last call time across [`wait`](Self::wait)s.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Option<Instant>,
    calls: usize,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: None,
            calls: 0,
        }
    }

    /// Negative, NaN or infinite intervals are treated as no throttling.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self::new(Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO))
    }

    pub fn wait(&mut self) -> Instant {
        let now = throttle(self.last_call, self.min_interval);
        self.last_call = Some(now);
        self.calls += 1;
        now
    }

    /// Number of throttled calls made through this limiter.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_does_not_wait() {
        let start = Instant::now();
        RateLimiter::new(Duration::from_secs(5)).wait();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn consecutive_calls_are_spaced() {
        let mut limiter = RateLimiter::new(Duration::from_millis(60));
        let first = limiter.wait();
        let second = limiter.wait();
        assert!(second.duration_since(first) >= Duration::from_millis(60));
        assert_eq!(limiter.calls(), 2);
    }

    #[test]
    fn stale_last_call_does_not_wait() {
        let long_ago = Instant::now() - Duration::from_millis(200);
        let start = Instant::now();
        throttle(Some(long_ago), Duration::from_millis(100));
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn bad_interval_disables_throttling() {
        let mut limiter = RateLimiter::from_secs_f64(-3.0);
        limiter.wait();
        let start = Instant::now();
        limiter.wait();
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
