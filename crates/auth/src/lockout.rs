//! # Account Lockout
//!
//! In-process tracker of consecutive authentication failures per username.
//! Five consecutive failures lock the username for fifteen minutes; a
//! successful authentication resets the counter. State lives in a
//! concurrent map, so a restart clears it — acceptable for a single-node
//! control plane, and the interface allows swapping in a shared store.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct AttemptState {
    failures: u32,
    locked_until: Option<DateTime<Utc>>,
}

pub struct LockoutTracker {
    attempts: DashMap<String, AttemptState>,
    threshold: u32,
    lockout: Duration,
}

impl LockoutTracker {
    pub fn new(threshold: u32, lockout_minutes: i64) -> Self {
        Self {
            attempts: DashMap::new(),
            threshold,
            lockout: Duration::minutes(lockout_minutes),
        }
    }

    /// Returns the lock expiry when the username is currently locked.
    pub fn locked_until(&self, username: &str) -> Option<DateTime<Utc>> {
        self.locked_until_at(username, Utc::now())
    }

    /// Records a failed attempt. Returns `true` when this failure crossed the
    /// lockout threshold (the account just became locked).
    pub fn record_failure(&self, username: &str) -> bool {
        self.record_failure_at(username, Utc::now())
    }

    /// Clears lockout state after a successful authentication.
    pub fn reset(&self, username: &str) {
        self.attempts.remove(username);
    }

    fn locked_until_at(&self, username: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let expired = match self.attempts.get(username) {
            Some(state) => match state.locked_until {
                Some(until) if until > now => return Some(until),
                Some(_) => true,
                None => false,
            },
            None => return None,
        };
        if expired {
            // The lock ran out; the failure streak starts over.
            self.attempts.remove(username);
        }
        None
    }

    fn record_failure_at(&self, username: &str, now: DateTime<Utc>) -> bool {
        let mut entry = self
            .attempts
            .entry(username.to_string())
            .or_insert(AttemptState {
                failures: 0,
                locked_until: None,
            });

        entry.failures += 1;
        if entry.failures >= self.threshold && entry.locked_until.is_none() {
            entry.locked_until = Some(now + self.lockout);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_after_threshold_consecutive_failures() {
        let tracker = LockoutTracker::new(5, 15);
        let now = Utc::now();

        for i in 0..4 {
            assert!(!tracker.record_failure_at("alice", now), "failure {} locked early", i);
            assert!(tracker.locked_until_at("alice", now).is_none());
        }

        assert!(tracker.record_failure_at("alice", now));
        assert!(tracker.locked_until_at("alice", now).is_some());
    }

    #[test]
    fn lock_expires_and_streak_restarts() {
        let tracker = LockoutTracker::new(5, 15);
        let start = Utc::now();

        for _ in 0..5 {
            tracker.record_failure_at("alice", start);
        }
        assert!(tracker.locked_until_at("alice", start + Duration::minutes(14)).is_some());

        // Sixteen minutes after the failures the lock has lapsed and the
        // account authenticates normally again.
        let later = start + Duration::minutes(16);
        assert!(tracker.locked_until_at("alice", later).is_none());

        // One new failure does not re-lock: the streak restarted.
        assert!(!tracker.record_failure_at("alice", later));
        assert!(tracker.locked_until_at("alice", later).is_none());
    }

    #[test]
    fn success_resets_the_counter() {
        let tracker = LockoutTracker::new(5, 15);
        let now = Utc::now();

        for _ in 0..4 {
            tracker.record_failure_at("alice", now);
        }
        tracker.reset("alice");

        for _ in 0..4 {
            assert!(!tracker.record_failure_at("alice", now));
        }
        assert!(tracker.locked_until_at("alice", now).is_none());
    }

    #[test]
    fn usernames_are_tracked_independently() {
        let tracker = LockoutTracker::new(5, 15);
        let now = Utc::now();

        for _ in 0..5 {
            tracker.record_failure_at("alice", now);
        }
        assert!(tracker.locked_until_at("alice", now).is_some());
        assert!(tracker.locked_until_at("bob", now).is_none());
    }
}
