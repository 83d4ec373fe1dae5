//! "Run after N ms" primitive.
//!
//! Tasks are keyed; scheduling a key that is already queued replaces it, which
//! is what debounces settings writes and wake arming. The queue holds no clock
//! of its own: callers pass "now", so a virtual clock drives it in tests.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub struct DeferredQueue<K> {
    tasks: Vec<(DateTime<Utc>, K)>,
}

impl<K> Default for DeferredQueue<K> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<K: PartialEq + Copy> DeferredQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `key` to run `after_ms` from `now`, replacing any pending run.
    pub fn schedule(&mut self, key: K, now: DateTime<Utc>, after_ms: u64) {
        self.cancel(key);
        let due = now + Duration::milliseconds(i64::try_from(after_ms).unwrap_or(i64::MAX / 2));
        self.tasks.push((due, key));
    }

    pub fn cancel(&mut self, key: K) {
        self.tasks.retain(|(_, k)| *k != key);
    }

    pub fn is_pending(&self, key: K) -> bool {
        self.tasks.iter().any(|(_, k)| *k == key)
    }

    /// Earliest due time.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.tasks.iter().map(|(due, _)| *due).min()
    }

    /// Removes and returns the earliest task due at or before `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<K> {
        let (pos, _) = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, (due, _))| *due <= now)
            .min_by_key(|(_, (due, _))| *due)?;
        Some(self.tasks.remove(pos).1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 6, 0, 0).unwrap()
    }

    #[test]
    fn tasks_run_in_due_order() {
        let mut q = DeferredQueue::new();
        q.schedule("b", t0(), 200);
        q.schedule("a", t0(), 100);
        assert_eq!(q.pop_due(t0()), None);
        let later = t0() + Duration::milliseconds(250);
        assert_eq!(q.pop_due(later), Some("a"));
        assert_eq!(q.pop_due(later), Some("b"));
        assert_eq!(q.next_due(), None);
    }

    #[test]
    fn rescheduling_debounces() {
        let mut q = DeferredQueue::new();
        q.schedule("persist", t0(), 1000);
        q.schedule("persist", t0() + Duration::milliseconds(900), 1000);
        assert_eq!(q.pop_due(t0() + Duration::milliseconds(1000)), None);
        assert_eq!(q.next_due(), Some(t0() + Duration::milliseconds(1900)));
    }

    #[test]
    fn cancel_removes_pending() {
        let mut q = DeferredQueue::new();
        q.schedule(1, t0(), 10);
        assert!(q.is_pending(1));
        q.cancel(1);
        assert!(!q.is_pending(1));
        assert_eq!(q.next_due(), None);
    }
}
