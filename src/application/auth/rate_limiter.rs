//! Per-client fixed-window rate limiter
//!
//! Windows live in a [`DashMap`], so the check-and-increment for one key runs
//! under that key's shard lock while unrelated clients proceed on other
//! shards. All timing uses [`Instant`]; wall-clock jumps never reset a window.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Longest window or ban the limiter tracks; longer settings are clamped.
pub const MAX_SPAN: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Requests admitted per key per window.
    pub limit: u32,
    pub window: Duration,
    /// How long a key is refused outright after exceeding the limit. Zero disables bans.
    pub ban: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            window: Duration::from_secs(60),
            ban: Duration::ZERO,
        }
    }
}

/// Outcome of a single [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
    Banned { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RateDecision::Allowed { .. } => None,
            RateDecision::Limited { retry_after } | RateDecision::Banned { retry_after } => {
                Some(*retry_after)
            }
        }
    }
}

#[derive(Debug)]
struct Window {
    count: u32,
    started: Instant,
    last_seen: Instant,
    banned_until: Option<Instant>,
}

impl Window {
    fn fresh(now: Instant) -> Self {
        Self {
            count: 0,
            started: now,
            last_seen: now,
            banned_until: None,
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let config = RateLimitConfig {
            window: config.window.min(MAX_SPAN),
            ban: config.ban.min(MAX_SPAN),
            ..config
        };
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// `true` when the request for `key` is admitted.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).is_allowed()
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    /// Count one request for `key` at `now`. The count never exceeds the limit:
    /// rejected requests do not consume budget.
    pub fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut window = self
            .windows
            .entry(key.to_owned())
            .or_insert_with(|| Window::fresh(now));
        window.last_seen = now;

        if let Some(until) = window.banned_until {
            if now < until {
                return RateDecision::Banned {
                    retry_after: until - now,
                };
            }
            window.banned_until = None;
            window.count = 0;
            window.started = now;
        }

        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= self.config.window {
            window.count = 0;
            window.started = now;
        }

        if window.count < self.config.limit {
            window.count += 1;
            return RateDecision::Allowed {
                remaining: self.config.limit - window.count,
            };
        }

        if !self.config.ban.is_zero() {
            // Unrepresentable deadlines fall back to the plain window limit.
            window.banned_until = now.checked_add(self.config.ban);
            return RateDecision::Limited {
                retry_after: self.config.ban,
            };
        }

        let retry_after = window
            .started
            .checked_add(self.config.window)
            .map_or(self.config.window, |end| end.saturating_duration_since(now));
        RateDecision::Limited { retry_after }
    }

    /// Drop windows with no traffic for `idle` and whose ban (if any) has
    /// lapsed. Returns the number of keys removed.
    pub fn evict_idle_at(&self, now: Instant, idle: Duration) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| {
            let banned = w.banned_until.is_some_and(|until| now < until);
            banned || now.saturating_duration_since(w.last_seen) < idle
        });
        before.saturating_sub(self.windows.len())
    }

    /// Evict keys idle for three full windows.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now(), self.config.window.saturating_mul(3))
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
