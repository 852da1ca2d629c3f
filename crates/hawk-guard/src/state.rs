//! Transient countdown state, keyed per (user, instance).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorKey {
    pub user_id: String,
    pub instance_id: String,
}

impl MonitorKey {
    pub fn new(user_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            instance_id: instance_id.into(),
        }
    }
}

/// Normal has no entry; only these two phases are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Breach seen, grace window running.
    Alerted,
    /// Grace window elapsed, stop command in flight.
    ShuttingDown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringState {
    pub phase: Phase,
    pub alerted_at: DateTime<Utc>,
    pub scheduled_shutdown_at: DateTime<Utc>,
}

impl MonitoringState {
    pub fn alerted(now: DateTime<Utc>, grace: chrono::Duration) -> Self {
        Self {
            phase: Phase::Alerted,
            alerted_at: now,
            scheduled_shutdown_at: now + grace,
        }
    }

    pub fn is_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.scheduled_shutdown_at
    }

    /// Whole seconds left in the grace window, rounded up.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.scheduled_shutdown_at - now).num_milliseconds();
        if millis <= 0 { 0 } else { (millis + 999) / 1000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap;

    #[test]
    fn test_remaining_rounds_up() {
        let t0 = Utc::now();
        let state = MonitoringState::alerted(t0, Duration::seconds(30));
        assert_eq!(state.remaining_secs(t0), 30);
        assert_eq!(state.remaining_secs(t0 + Duration::milliseconds(5_200)), 25);
        assert_eq!(state.remaining_secs(t0 + Duration::seconds(31)), 0);
        assert!(!state.is_elapsed(t0 + Duration::milliseconds(29_999)));
        assert!(state.is_elapsed(t0 + Duration::seconds(30)));
    }

    #[test]
    fn test_keys_do_not_collide() {
        // "ab" + "c" and "a" + "bc" concatenate to the same string.
        let mut map = HashMap::new();
        map.insert(MonitorKey::new("ab", "c"), 1);
        map.insert(MonitorKey::new("a", "bc"), 2);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&MonitorKey::new("ab", "c")], 1);
    }
}
