use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Bounded, TTL-based dedup set for `externalMessageId` (spec §4.6 step 1).
///
/// Not a strict LRU: entries expire on TTL rather than on access, and
/// eviction only runs opportunistically once the map grows past
/// `max_entries`. That's the same tradeoff the slot-pressure guard makes —
/// plain atomics/maps instead of reaching for a generic fairness-preserving
/// structure that would hide the one invariant that matters here (replays
/// within the TTL window are dropped, a caller hammering outside the
/// capacity does not leak memory forever).
pub struct Deduplicator {
    seen: DashMap<String, Instant>,
    ttl: Duration,
    max_entries: usize,
}

impl Deduplicator {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { seen: DashMap::new(), ttl, max_entries }
    }

    /// Default dedup window per spec §4.6 step 1 (~1 hour).
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(3_600), 10_000)
    }

    /// Returns `true` if `id` has not been seen within the TTL window (and
    /// records it as seen now); `false` if it's a replay to silently drop.
    pub fn check(&self, id: &str) -> bool {
        let now = Instant::now();

        if let Some(seen_at) = self.seen.get(id) {
            if now.duration_since(*seen_at) < self.ttl {
                return false;
            }
        }

        self.seen.insert(id.to_string(), now);

        if self.seen.len() > self.max_entries {
            self.sweep(now);
        }

        true
    }

    fn sweep(&self, now: Instant) {
        self.seen.retain(|_, seen_at| now.duration_since(*seen_at) < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_fresh_and_second_is_a_duplicate() {
        let dedup = Deduplicator::new(Duration::from_secs(3600), 100);
        assert!(dedup.check("msg-1"));
        assert!(!dedup.check("msg-1"));
    }

    #[test]
    fn distinct_ids_are_independent() {
        let dedup = Deduplicator::new(Duration::from_secs(3600), 100);
        assert!(dedup.check("a"));
        assert!(dedup.check("b"));
    }

    #[test]
    fn expired_entry_is_treated_as_fresh_again() {
        let dedup = Deduplicator::new(Duration::from_millis(10), 100);
        assert!(dedup.check("msg-1"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(dedup.check("msg-1"));
    }

    #[test]
    fn sweep_drops_expired_entries_once_capacity_is_exceeded() {
        let dedup = Deduplicator::new(Duration::from_millis(5), 2);
        assert!(dedup.check("a"));
        assert!(dedup.check("b"));
        std::thread::sleep(Duration::from_millis(20));
        // Crossing max_entries triggers a sweep that should clear both stale entries.
        assert!(dedup.check("c"));
        assert!(dedup.len() <= 2);
    }
}
