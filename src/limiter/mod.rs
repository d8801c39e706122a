//! Fixed-window admission control, one limiter per session.
//!
//! Windows are aligned to the epoch: the window id is
//! `now_secs / window_seconds`. The counter for `(session, window)` lives in
//! the session's own store under `rl:{window}`, so it is never read outside
//! its owning session and survives restarts when the store does.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use crate::config::RateLimitConfig;
use crate::error::{GatewayError, Result};
use crate::storage::StateStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

const WINDOW_KEY_PREFIX: &str = "rl:";

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32 },
    Denied { retry_after_secs: u64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterStats {
    pub admitted: u64,
    pub rejected: u64,
}

pub struct RateLimiter {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    max_requests: u32,
    window_seconds: u64,
    admitted: AtomicU64,
    rejected: AtomicU64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            clock,
            max_requests: config.max_requests,
            window_seconds: config.window_seconds.max(1),
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    fn window_key(window: u64) -> String {
        format!("{}{}", WINDOW_KEY_PREFIX, window)
    }

    fn parse_count(key: &str, raw: Option<&[u8]>) -> Result<u32> {
        match raw {
            None => Ok(0),
            Some(raw) => std::str::from_utf8(raw)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| GatewayError::Storage(format!("corrupt rate-limit counter at '{}'", key))),
        }
    }

    fn read_count(&self, key: &str) -> Result<u32> {
        Self::parse_count(key, self.store.get(key)?.as_deref())
    }

    /// Admit or reject one request for this session.
    ///
    /// On admission the incremented counter is persisted before returning.
    /// The check and increment run as one store update, so limiters sharing
    /// a store never over-admit between them.
    pub fn admit(&self) -> Result<Admission> {
        let now = self.clock.now_secs();
        let window = now / self.window_seconds;
        let key = Self::window_key(window);

        let mut admission = Admission::Denied {
            retry_after_secs: self.window_seconds - (now % self.window_seconds),
        };
        self.store.update(&key, &mut |raw| {
            let count = Self::parse_count(&key, raw.as_deref())?;
            if count >= self.max_requests {
                return Ok(None);
            }
            admission = Admission::Allowed {
                remaining: self.max_requests - count - 1,
            };
            Ok(Some((count + 1).to_string().into_bytes()))
        })?;

        match admission {
            Admission::Allowed { remaining } => {
                self.admitted.fetch_add(1, Ordering::Relaxed);
                debug!("Admitted request in window {} ({} remaining)", window, remaining);
                if window > 0 {
                    self.forget_window(window - 1);
                }
            }
            Admission::Denied { retry_after_secs } => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                debug!("Rejected request in window {}, retry after {}s", window, retry_after_secs);
            }
        }

        Ok(admission)
    }

    // Stale windows are never read again, so a failed delete is only logged
    fn forget_window(&self, window: u64) {
        if let Err(e) = self.store.delete(&Self::window_key(window)) {
            warn!("Failed to drop stale rate-limit window {}: {}", window, e);
        }
    }

    /// Requests already admitted in the current window.
    pub fn current_count(&self) -> Result<u32> {
        let window = self.clock.now_secs() / self.window_seconds;
        self.read_count(&Self::window_key(window))
    }

    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn limiter_at(secs: u64) -> (RateLimiter, Arc<ManualClock>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(secs));
        let limiter = RateLimiter::new(store.clone(), clock.clone(), &RateLimitConfig::default());
        (limiter, clock, store)
    }

    #[test]
    fn test_eleventh_request_in_window_is_denied() {
        let (limiter, _clock, _store) = limiter_at(6_000_015);
        for _ in 0..10 {
            assert!(limiter.admit().unwrap().is_allowed());
        }
        assert_eq!(
            limiter.admit().unwrap(),
            Admission::Denied { retry_after_secs: 45 }
        );
        assert_eq!(limiter.stats().rejected, 1);
    }

    #[test]
    fn test_retry_after_at_window_start_is_full_window() {
        let (limiter, _clock, _store) = limiter_at(6_000_000);
        for _ in 0..10 {
            limiter.admit().unwrap();
        }
        assert_eq!(
            limiter.admit().unwrap(),
            Admission::Denied { retry_after_secs: 60 }
        );
    }

    #[test]
    fn test_new_window_resets_and_drops_previous_bucket() {
        let (limiter, clock, store) = limiter_at(6_000_000);
        for _ in 0..10 {
            limiter.admit().unwrap();
        }
        assert!(store.get("rl:100000").unwrap().is_some());

        clock.advance(60);
        assert_eq!(limiter.admit().unwrap(), Admission::Allowed { remaining: 9 });
        assert!(store.get("rl:100000").unwrap().is_none());
        assert_eq!(store.get("rl:100001").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_limiters_sharing_a_store_share_the_budget() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(6_000_000));
        let old = RateLimiter::new(store.clone(), clock.clone(), &RateLimitConfig::default());
        let new = RateLimiter::new(store, clock, &RateLimitConfig::default());

        for _ in 0..5 {
            assert!(old.admit().unwrap().is_allowed());
            assert!(new.admit().unwrap().is_allowed());
        }
        assert!(!old.admit().unwrap().is_allowed());
        assert!(!new.admit().unwrap().is_allowed());
    }

    #[test]
    fn test_corrupt_counter_is_an_error() {
        let (limiter, _clock, store) = limiter_at(6_000_000);
        store.put("rl:100000", b"many").unwrap();
        assert!(matches!(limiter.admit(), Err(GatewayError::Storage(_))));
    }
}
