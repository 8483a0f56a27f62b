//! # Rate Limiting
//!
//! Per-client-IP sliding window. Each key keeps the timestamps of its recent
//! requests; a request is admitted while fewer than `limit` timestamps fall
//! inside the trailing window.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;

pub struct RateLimiter {
    windows: DashMap<String, VecDeque<DateTime<Utc>>>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            windows: DashMap::new(),
            limit: limit_per_minute as usize,
            window: Duration::seconds(60),
        }
    }

    /// Admits or rejects a request from `key`. Admitted requests count
    /// against the window immediately.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Utc::now())
    }

    fn check_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut entry = self.windows.entry(key.to_string()).or_default();
        let cutoff = now - self.window;
        while entry.front().is_some_and(|t| *t <= cutoff) {
            entry.pop_front();
        }
        if entry.len() >= self.limit {
            return false;
        }
        entry.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(3);
        let now = Utc::now();

        assert!(limiter.check_at("10.0.0.1", now));
        assert!(limiter.check_at("10.0.0.1", now));
        assert!(limiter.check_at("10.0.0.1", now));
        assert!(!limiter.check_at("10.0.0.1", now));
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new(2);
        let start = Utc::now();

        assert!(limiter.check_at("ip", start));
        assert!(limiter.check_at("ip", start + Duration::seconds(30)));
        assert!(!limiter.check_at("ip", start + Duration::seconds(45)));

        // The first request has left the window; one slot frees up.
        assert!(limiter.check_at("ip", start + Duration::seconds(61)));
        assert!(!limiter.check_at("ip", start + Duration::seconds(62)));
    }

    #[test]
    fn clients_do_not_share_windows() {
        let limiter = RateLimiter::new(1);
        let now = Utc::now();

        assert!(limiter.check_at("a", now));
        assert!(limiter.check_at("b", now));
        assert!(!limiter.check_at("a", now));
    }
}
