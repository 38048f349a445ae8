use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

/// Checks between sweeps of idle keys.
const SWEEP_EVERY: usize = 1024;

/// Sliding window in-memory rate limiter (process local).
#[derive(Clone, Default)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    checks: Arc<AtomicUsize>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window { entry.pop_front(); } else { break; }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }

    /// Drops keys with no hit inside `idle`.
    pub fn sweep(&self, idle: Duration) {
        let now = Instant::now();
        self.store.retain(|_, hits| hits.back().is_some_and(|t| now.duration_since(*t) < idle));
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    fn tick(&self) -> usize {
        self.checks.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Posting budgets per client address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub thread_limit: usize,
    pub thread_window: Duration,
    pub reply_limit: usize,
    pub reply_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            thread_limit: 5,
            thread_window: Duration::from_secs(300),
            reply_limit: 20,
            reply_window: Duration::from_secs(60),
        }
    }
}

/// Guard used by the posting handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }
    pub fn allow_thread(&self, ip: &str) -> bool { self.guard(&format!("thread:{ip}"), self.cfg.thread_limit, self.cfg.thread_window) }
    pub fn allow_reply(&self, ip: &str) -> bool { self.guard(&format!("reply:{ip}"), self.cfg.reply_limit, self.cfg.reply_window) }

    fn guard(&self, key: &str, limit: usize, window: Duration) -> bool {
        let allowed = self.limiter.check(key, limit, window);
        if self.limiter.tick() % SWEEP_EVERY == 0 {
            self.limiter.sweep(self.cfg.thread_window.max(self.cfg.reply_window));
        }
        allowed
    }
}
