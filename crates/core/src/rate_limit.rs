// Sliding-window admission control keyed by tool name

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Rate limiter statistics reported through `server/info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStats {
    pub max_calls: usize,
    pub window_seconds: u64,
    pub total_blocked: u64,
    pub tracked_keys: usize,
}

/// Allows at most `max_calls` per key within any trailing `window`
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<HashMap<String, VecDeque<Instant>>>,
    total_blocked: AtomicU64,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            calls: Mutex::new(HashMap::new()),
            total_blocked: AtomicU64::new(0),
        }
    }

    /// Admit and record a call, or return how long until a slot frees up
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        let window = calls.entry(key.to_string()).or_default();
        prune(window, now, self.window);

        if window.len() >= self.max_calls {
            self.total_blocked.fetch_add(1, Ordering::Relaxed);
            let retry_after = window
                .front()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
                .unwrap_or(self.window);
            return Err(retry_after);
        }

        window.push_back(now);
        Ok(())
    }

    pub fn stats(&self) -> RateLimitStats {
        RateLimitStats {
            max_calls: self.max_calls,
            window_seconds: self.window.as_secs(),
            total_blocked: self.total_blocked.load(Ordering::Relaxed),
            tracked_keys: self
                .calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while let Some(oldest) = window.front() {
        if now.saturating_duration_since(*oldest) < span {
            break;
        }
        window.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_n_calls_admitted() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10));

        for _ in 0..3 {
            assert!(limiter.check("ns.op").is_ok());
        }
        assert!(limiter.check("ns.op").is_err());
        assert_eq!(limiter.stats().total_blocked, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));

        limiter.check("ns.op").unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        limiter.check("ns.op").unwrap();

        let retry_after = limiter.check("ns.op").unwrap_err();
        assert_eq!(retry_after, Duration::from_secs(6));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(limiter.check("ns.op").is_ok());
        assert!(limiter.check("ns.op").is_err());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.check("ns.op").is_ok());
        assert!(limiter.check("ns.op").is_ok());
        assert!(limiter.check("ns.op").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));

        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("b").is_ok());
        assert!(limiter.check("a").is_err());
        assert!(limiter.check("b").is_err());
        assert_eq!(limiter.stats().tracked_keys, 2);
        assert_eq!(limiter.stats().total_blocked, 2);
    }
}
