use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default window and allowance, matching the generation endpoint's
/// published limits.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_MAX_REQUESTS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl LimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LimitDecision::Allowed { .. })
    }
}

#[derive(Debug)]
struct WindowEntry {
    count: u32,
    started: Instant,
}

/// Fixed-window request limiter keyed by provider name.
///
/// Each key gets `max_requests` per `window`; the first request after a
/// window expires starts a fresh one. Expired entries for other keys are
/// evicted lazily on each check rather than by a background sweep.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    window: Duration,
    max_requests: u32,
    entries: HashMap<String, WindowEntry>,
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_REQUESTS)
    }
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            entries: HashMap::new(),
        }
    }

    pub fn check(&mut self, key: &str) -> LimitDecision {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&mut self, key: &str, now: Instant) -> LimitDecision {
        let window = self.window;
        self.entries
            .retain(|_, entry| now.duration_since(entry.started) < window);

        let entry = self.entries.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            started: now,
        });
        if entry.count >= self.max_requests {
            let elapsed = now.duration_since(entry.started);
            return LimitDecision::Limited {
                retry_after: window.saturating_sub(elapsed),
            };
        }
        entry.count += 1;
        LimitDecision::Allowed {
            remaining: self.max_requests - entry.count,
        }
    }
}
