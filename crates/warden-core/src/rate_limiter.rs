//! Sliding-window rate limiter, one window per tool. Hand-rolled rather
//! than built on a general rate-limiting crate because the window is
//! exactly the `RateBucket{tool, timestamps}` shape called for in the
//! client-visible `retry_after_ms` calculation, not a generic token
//! bucket.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);
const CLEANUP_EVERY_N_CALLS: u64 = 100;

struct RateBucket {
    timestamps: VecDeque<Instant>,
}

pub struct RateLimiter {
    buckets: Mutex<HashMap<String, RateBucket>>,
    call_count: AtomicU64,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            call_count: AtomicU64::new(0),
        }
    }

    /// Record a call attempt for `tool` against `limit` (calls per minute).
    /// Returns `Ok(())` if the call is admitted, or `Err(retry_after_ms)`
    /// naming how long until the oldest timestamp in the window expires.
    pub fn check(&self, tool: &str, limit: u32) -> Result<(), u64> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets.entry(tool.to_string()).or_insert_with(|| RateBucket {
            timestamps: VecDeque::new(),
        });

        while let Some(&front) = bucket.timestamps.front() {
            if now.duration_since(front) >= WINDOW {
                bucket.timestamps.pop_front();
            } else {
                break;
            }
        }

        if limit == 0 || bucket.timestamps.len() as u32 >= limit {
            let retry_after = bucket
                .timestamps
                .front()
                .map(|&oldest| WINDOW.saturating_sub(now.duration_since(oldest)))
                .unwrap_or(WINDOW);
            return Err(retry_after.as_millis() as u64);
        }

        bucket.timestamps.push_back(now);
        drop(buckets);

        if self.call_count.fetch_add(1, Ordering::Relaxed) % CLEANUP_EVERY_N_CALLS == 0 {
            self.cleanup(now);
        }
        Ok(())
    }

    /// Drop buckets that have gone fully idle, so tools that are called
    /// once and never again don't grow the map forever.
    fn cleanup(&self, now: Instant) {
        let mut buckets = self.buckets.lock().unwrap();
        buckets.retain(|_, bucket| {
            bucket
                .timestamps
                .back()
                .is_some_and(|&last| now.duration_since(last) < WINDOW)
        });
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_calls_up_to_limit() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("echo", 3).is_ok());
        }
        assert!(limiter.check("echo", 3).is_err());
    }

    #[test]
    fn separate_tools_have_separate_buckets() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("echo", 1).is_ok());
        assert!(limiter.check("read_file", 1).is_ok());
        assert!(limiter.check("echo", 1).is_err());
    }

    #[test]
    fn retry_after_is_positive_when_limited() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("echo", 1).is_ok());
        let retry_after = limiter.check("echo", 1).unwrap_err();
        assert!(retry_after > 0 && retry_after <= WINDOW.as_millis() as u64);
    }

    #[test]
    fn zero_limit_always_rejects_without_panicking() {
        let limiter = RateLimiter::new();
        let retry_after = limiter.check("echo", 0).unwrap_err();
        assert_eq!(retry_after, WINDOW.as_millis() as u64);
    }

    #[test]
    fn idle_bucket_is_pruned_by_cleanup() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("echo", 1).is_ok());
        {
            let mut buckets = limiter.buckets.lock().unwrap();
            let bucket = buckets.get_mut("echo").unwrap();
            bucket.timestamps[0] = Instant::now() - Duration::from_secs(61);
        }
        limiter.cleanup(Instant::now());
        assert!(limiter.buckets.lock().unwrap().get("echo").is_none());
    }
}
