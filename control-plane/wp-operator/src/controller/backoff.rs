use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-object requeue delays for failed reconciles.
///
/// Transient failures back off exponentially from `base` to `max`;
/// permanent ones (validation, adoption) wait `max` straight away, since
/// only an edit to the Wordpress or the child can fix them.
///
/// A failing object is requeued at least every `max`, so an entry untouched
/// for twice that long belongs to an object that is gone; such entries are
/// dropped on the next failure of any object.
#[derive(Debug)]
pub struct RequeueBackoff {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<String, Streak>>,
}

#[derive(Debug, Clone, Copy)]
struct Streak {
    count: u32,
    last: Instant,
}

impl RequeueBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn next_delay(&self, key: &str, transient: bool) -> Duration {
        let now = Instant::now();
        let stale_after = self.max.saturating_mul(2);
        let mut failures =
            self.failures.lock().unwrap_or_else(|e| e.into_inner());
        failures.retain(|_, s| now.duration_since(s.last) <= stale_after);
        let streak = failures
            .entry(key.to_string())
            .or_insert(Streak { count: 0, last: now });
        streak.count = streak.count.saturating_add(1);
        streak.last = now;
        if !transient {
            return self.max;
        }
        let factor = 2u32.saturating_pow(streak.count.saturating_sub(1).min(16));
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&self, key: &str) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    pub fn failures(&self, key: &str) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map_or(0, |s| s.count)
    }

    /// Objects currently in a failure streak.
    pub fn tracked(&self) -> usize {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
