use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

/// Sliding-window limiter keyed by an arbitrary source string.
pub struct SlidingWindowRateLimiter {
    max_events: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(max_events: usize, window: Duration) -> Self {
        SlidingWindowRateLimiter {
            max_events: max_events.max(1),
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Records the event and returns whether it fits in the window.
    /// Rejected events are not counted.
    pub async fn check(&self, source: &str, now: DateTime<Utc>) -> bool {
        let mut hits = self.hits.lock().await;
        let cutoff = now - self.window;
        hits.retain(|_, events| events.back().is_some_and(|last| *last > cutoff));

        let events = hits.entry(source.to_string()).or_default();
        while events.front().is_some_and(|first| *first <= cutoff) {
            events.pop_front();
        }
        if events.len() >= self.max_events {
            return false;
        }
        events.push_back(now);
        true
    }
}
