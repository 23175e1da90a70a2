//! Per-key windowed rate limiter backing auth policy's `AuthRateLimiter`
//! (spec.md §4.8). Windows expire lazily: a key whose window has elapsed is
//! reset the next time it's checked or recorded, rather than on a timer.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

struct Bucket {
    window_start: Instant,
    count: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

pub struct AuthRateLimiter {
    window: Duration,
    max_requests: u32,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl AuthRateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self { window, max_requests, buckets: Mutex::new(HashMap::new()) }
    }

    /// Reports whether `key` may proceed without recording a request.
    pub fn check(&self, key: &str) -> RateLimitStatus {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        let expired = buckets.get(key).is_some_and(|b| now.duration_since(b.window_start) >= self.window);
        if expired {
            buckets.remove(key);
        }

        let count = buckets.get(key).map(|b| b.count).unwrap_or(0);
        let window_start = buckets.get(key).map(|b| b.window_start).unwrap_or(now);
        let elapsed = now.duration_since(window_start);
        let remaining_window = self.window.saturating_sub(elapsed);

        RateLimitStatus {
            allowed: count < self.max_requests,
            remaining: self.max_requests.saturating_sub(count),
            reset_at: Utc::now() + chrono::Duration::from_std(remaining_window).unwrap_or_default(),
        }
    }

    /// Records a request against `key`, starting a fresh window if the
    /// previous one has elapsed.
    pub fn record(&self, key: &str) {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        let entry = buckets.entry(key.to_string()).or_insert(Bucket { window_start: now, count: 0 });
        if now.duration_since(entry.window_start) >= self.window {
            entry.window_start = now;
            entry.count = 0;
        }
        entry.count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_then_denies() {
        let limiter = AuthRateLimiter::new(Duration::from_secs(60), 2);
        assert!(limiter.check("k").allowed);
        limiter.record("k");
        assert!(limiter.check("k").allowed);
        limiter.record("k");
        assert!(!limiter.check("k").allowed);
    }

    #[test]
    fn separate_keys_have_independent_windows() {
        let limiter = AuthRateLimiter::new(Duration::from_secs(60), 1);
        limiter.record("a");
        assert!(!limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
    }

    #[test]
    fn window_resets_after_elapsing() {
        let limiter = AuthRateLimiter::new(Duration::from_millis(20), 1);
        limiter.record("k");
        assert!(!limiter.check("k").allowed);
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check("k").allowed);
    }
}
