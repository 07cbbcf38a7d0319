//! Fixed-window, per-caller request limiting for the proxy endpoint.

use crate::constants::{RATE_LIMIT_MAX_REQUESTS, RATE_LIMIT_WINDOW};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Counts requests per caller inside fixed windows.
///
/// Each limiter owns its own table, so separate gateways (and tests) never
/// share counts.
#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    window: Duration,
    max_requests: u32,
    windows: Mutex<HashMap<String, Window>>,
}

impl Default for FixedWindowRateLimiter {
    fn default() -> Self {
        Self::new(RATE_LIMIT_WINDOW, RATE_LIMIT_MAX_REQUESTS)
    }
}

impl FixedWindowRateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Records a request from `caller` and reports whether it is allowed.
    pub fn check(&self, caller: &str) -> bool {
        self.check_at(caller, Instant::now())
    }

    /// Same as [`check`](Self::check) at an explicit instant.
    pub fn check_at(&self, caller: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock();
        windows.retain(|_, w| now <= w.reset_at);

        match windows.get_mut(caller) {
            Some(w) if w.count >= self.max_requests => false,
            Some(w) => {
                w.count += 1;
                true
            }
            None => {
                windows.insert(
                    caller.to_string(),
                    Window {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                true
            }
        }
    }

    /// Callers with an open window.
    pub fn tracked_callers(&self) -> usize {
        self.windows.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_per_window() {
        let limiter = FixedWindowRateLimiter::new(Duration::from_secs(60), 3);
        let t0 = Instant::now();
        assert!(limiter.check_at("1.2.3.4", t0));
        assert!(limiter.check_at("1.2.3.4", t0));
        assert!(limiter.check_at("1.2.3.4", t0));
        assert!(!limiter.check_at("1.2.3.4", t0 + Duration::from_secs(59)));
    }

    #[test]
    fn callers_are_counted_separately() {
        let limiter = FixedWindowRateLimiter::new(Duration::from_secs(60), 1);
        let t0 = Instant::now();
        assert!(limiter.check_at("a", t0));
        assert!(!limiter.check_at("a", t0));
        assert!(limiter.check_at("b", t0));
    }

    #[test]
    fn window_resets_after_it_expires() {
        let limiter = FixedWindowRateLimiter::new(Duration::from_secs(60), 1);
        let t0 = Instant::now();
        assert!(limiter.check_at("a", t0));
        assert!(!limiter.check_at("a", t0 + Duration::from_secs(60)));
        assert!(limiter.check_at("a", t0 + Duration::from_secs(61)));
        assert_eq!(limiter.tracked_callers(), 1);
    }

    #[test]
    fn instances_do_not_share_state() {
        let first = FixedWindowRateLimiter::new(Duration::from_secs(60), 1);
        let second = FixedWindowRateLimiter::new(Duration::from_secs(60), 1);
        let t0 = Instant::now();
        assert!(first.check_at("a", t0));
        assert!(second.check_at("a", t0));
    }
}
