//! Fixed-window call budgets.
//!
//! A [`RateLimiter`] allows `rate` calls per `window`. Once the budget is spent
//! it either parks the caller until the window ends (when the wait is at most
//! the configured ceiling) or fails fast with [`Error::RateLimited`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use moddb::ratelimit::{LimitMode, RateLimiter};
//!
//! # async fn example() -> moddb::Result<()> {
//! let limiter = RateLimiter::new("comment", 1, Duration::from_secs(60), LimitMode::FailFast);
//!
//! limiter.call().await?;            // first call always goes through
//! assert!(limiter.call().await.is_err()); // budget spent for this minute
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::config::{LimiterConfig, LimitsConfig};
use crate::error::{Error, Result};

/// What to do when the budget for the current window is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitMode {
    /// Sleep until the window ends if that takes at most `ceiling`,
    /// otherwise fail.
    Block { ceiling: Duration },
    /// Always fail with [`Error::RateLimited`].
    FailFast,
}

/// Window bookkeeping. `window_start == None` means no call was ever made,
/// which behaves like a window that expired long ago.
#[derive(Debug, Default)]
struct WindowState {
    window_start: Option<Instant>,
    call_count: u32,
}

impl WindowState {
    /// A window whose end `Instant` cannot represent never expires.
    fn expired(&self, now: Instant, window: Duration) -> bool {
        match self.window_start {
            None => true,
            Some(start) => start.checked_add(window).is_some_and(|end| now >= end),
        }
    }

    fn reset(&mut self, now: Instant) {
        self.window_start = Some(now);
        self.call_count = 0;
    }

    fn remaining(&self, now: Instant, window: Duration) -> Duration {
        match self.window_start {
            None => Duration::ZERO,
            Some(start) => start
                .checked_add(window)
                .map_or(Duration::MAX, |end| end.saturating_duration_since(now)),
        }
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(if value > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

/// Point-in-time view of a limiter, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSnapshot {
    pub call_count: u32,
    pub rate: u32,
    pub remaining: Duration,
}

/// A call budget over a fixed time window.
///
/// Safe to share through `Arc`. The window state sits behind an async mutex
/// that stays locked while a blocking caller sleeps, so concurrent callers
/// are served strictly one at a time.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    rate: u32,
    window: Duration,
    mode: LimitMode,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    /// Create a limiter allowing `rate` calls per `window`.
    #[must_use]
    pub fn new(name: impl Into<String>, rate: u32, window: Duration, mode: LimitMode) -> Self {
        Self {
            name: name.into(),
            rate,
            window,
            mode,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Build a limiter from its configuration entry.
    ///
    /// Seconds too large for a `Duration` saturate; negative or NaN values
    /// become zero.
    #[must_use]
    pub fn from_config(name: impl Into<String>, config: &LimiterConfig) -> Self {
        let mode = match config.sleep_ceiling_secs {
            Some(secs) => LimitMode::Block {
                ceiling: seconds(secs),
            },
            None => LimitMode::FailFast,
        };
        Self::new(name, config.rate, seconds(config.window_secs), mode)
    }

    /// Site-wide budget: 40 requests per five minutes, waits out the window.
    #[must_use]
    pub fn global() -> Self {
        Self::from_config("global", &LimiterConfig::global())
    }

    /// Burst control: 5 requests per second, waits out the window.
    #[must_use]
    pub fn throttle() -> Self {
        Self::from_config("throttle", &LimiterConfig::throttle())
    }

    /// One posted comment per minute, fails fast.
    #[must_use]
    pub fn comment() -> Self {
        Self::from_config("comment", &LimiterConfig::comment())
    }

    /// One login attempt per five seconds, fails fast.
    #[must_use]
    pub fn login() -> Self {
        Self::from_config("login", &LimiterConfig::login())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn mode(&self) -> LimitMode {
        self.mode
    }

    /// Spend one call from the budget.
    ///
    /// Resets the window if it has elapsed. When the budget is spent, sleeps
    /// for the rest of the window in [`LimitMode::Block`] mode (if within the
    /// ceiling) and then counts the call against the fresh window; otherwise
    /// returns [`Error::RateLimited`] with the time left.
    #[instrument(skip(self), fields(limiter = %self.name))]
    pub async fn call(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        if state.expired(now, self.window) {
            debug!("resetting ratelimit window");
            state.reset(now);
        }

        if self.rate == 0 {
            return Err(Error::RateLimited {
                remaining: state.remaining(now, self.window),
            });
        }

        if state.call_count < self.rate {
            state.call_count += 1;
            return Ok(());
        }

        let remaining = state.remaining(now, self.window);
        match self.mode {
            LimitMode::Block { ceiling } if remaining <= ceiling => {
                info!(remaining_ms = remaining.as_millis(), "ratelimited, sleeping");
                tokio::time::sleep(remaining).await;
                state.reset(Instant::now());
                state.call_count = 1;
                Ok(())
            }
            _ => {
                debug!(remaining_ms = remaining.as_millis(), "ratelimited, failing fast");
                Err(Error::RateLimited { remaining })
            }
        }
    }

    /// Current count and time left in the window.
    pub async fn snapshot(&self) -> LimiterSnapshot {
        let state = self.state.lock().await;
        let now = Instant::now();
        if state.expired(now, self.window) {
            return LimiterSnapshot {
                call_count: 0,
                rate: self.rate,
                remaining: Duration::ZERO,
            };
        }
        LimiterSnapshot {
            call_count: state.call_count,
            rate: self.rate,
            remaining: state.remaining(now, self.window),
        }
    }
}

/// The four limiters shared by a session and the client built on it.
#[derive(Debug, Clone)]
pub struct Limiters {
    pub global: Arc<RateLimiter>,
    pub throttle: Arc<RateLimiter>,
    pub comment: Arc<RateLimiter>,
    pub login: Arc<RateLimiter>,
}

impl Limiters {
    #[must_use]
    pub fn from_config(config: &LimitsConfig) -> Self {
        Self {
            global: Arc::new(RateLimiter::from_config("global", &config.global)),
            throttle: Arc::new(RateLimiter::from_config("throttle", &config.throttle)),
            comment: Arc::new(RateLimiter::from_config("comment", &config.comment)),
            login: Arc::new(RateLimiter::from_config("login", &config.login)),
        }
    }

    /// Every limiter, for reporting.
    pub fn all(&self) -> [&RateLimiter; 4] {
        [&*self.global, &*self.throttle, &*self.comment, &*self.login]
    }

    /// Guard an ordinary request: burst control first, then the site budget.
    pub async fn request(&self) -> Result<()> {
        guard(&[&*self.throttle, &*self.global]).await
    }
}

impl Default for Limiters {
    fn default() -> Self {
        Self::from_config(&LimitsConfig::default())
    }
}

/// Spend one call on each limiter in order, stopping at the first refusal.
///
/// Limiters earlier in the slice have already committed their call when a
/// later one refuses, so the order decides which limiter reports first.
pub async fn guard(limiters: &[&RateLimiter]) -> Result<()> {
    for limiter in limiters {
        limiter.call().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail_fast(rate: u32, secs: u64) -> RateLimiter {
        RateLimiter::new("test", rate, Duration::from_secs(secs), LimitMode::FailFast)
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_after_construction_succeeds() {
        let limiter = fail_fast(1, 60);
        assert!(limiter.call().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_rate_always_fails() {
        let limiter = RateLimiter::new(
            "closed",
            0,
            Duration::from_secs(1),
            LimitMode::Block {
                ceiling: Duration::from_secs(10),
            },
        );
        for _ in 0..3 {
            let err = limiter.call().await.unwrap_err();
            assert!(matches!(err, Error::RateLimited { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn budget_is_never_exceeded_within_a_window() {
        for rate in 1..=6 {
            let limiter = fail_fast(rate, 30);
            for _ in 0..rate {
                limiter.call().await.unwrap();
            }
            let err = limiter.call().await.unwrap_err();
            match err {
                Error::RateLimited { remaining } => {
                    assert!(remaining <= Duration::from_secs(30));
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_per_five_seconds_scenario() {
        let limiter = fail_fast(1, 5);

        limiter.call().await.unwrap();

        let err = limiter.call().await.unwrap_err();
        let remaining = err.retry_after().unwrap();
        assert_eq!(remaining, Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(limiter.call().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_window_resets_count_to_one() {
        let limiter = fail_fast(3, 10);
        for _ in 0..3 {
            limiter.call().await.unwrap();
        }

        tokio::time::sleep(Duration::from_secs(11)).await;
        limiter.call().await.unwrap();

        let snapshot = limiter.snapshot().await;
        assert_eq!(snapshot.call_count, 1);
        assert_eq!(snapshot.remaining, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn block_mode_sleeps_out_the_window() {
        let limiter = RateLimiter::new(
            "throttle",
            2,
            Duration::from_secs(1),
            LimitMode::Block {
                ceiling: Duration::from_secs(1),
            },
        );
        let start = Instant::now();
        for _ in 0..5 {
            limiter.call().await.unwrap();
        }
        // Two windows had to be waited out for calls 3 and 5.
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(limiter.snapshot().await.call_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn block_mode_fails_when_wait_exceeds_ceiling() {
        let limiter = RateLimiter::new(
            "global",
            1,
            Duration::from_secs(300),
            LimitMode::Block {
                ceiling: Duration::from_secs(10),
            },
        );
        limiter.call().await.unwrap();
        let err = limiter.call().await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(300)));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_window_end_never_expires() {
        let limiter = RateLimiter::new("forever", 1, Duration::MAX, LimitMode::FailFast);
        limiter.call().await.unwrap();

        let err = limiter.call().await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::MAX));
        assert_eq!(limiter.snapshot().await.call_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_config_saturates_instead_of_panicking() {
        let config = LimiterConfig {
            rate: 1,
            window_secs: 1e20,
            sleep_ceiling_secs: Some(f64::INFINITY),
        };
        let limiter = RateLimiter::from_config("huge", &config);
        assert_eq!(limiter.window(), Duration::MAX);
        assert_eq!(
            limiter.mode(),
            LimitMode::Block {
                ceiling: Duration::MAX
            }
        );

        let negative = LimiterConfig {
            rate: 1,
            window_secs: -3.0,
            sleep_ceiling_secs: None,
        };
        assert_eq!(RateLimiter::from_config("neg", &negative).window(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn guard_stops_at_first_refusal() {
        let global = fail_fast(10, 60);
        let comment = fail_fast(1, 60);

        guard(&[&global, &comment]).await.unwrap();
        assert!(guard(&[&global, &comment]).await.is_err());

        // The global limiter committed both calls; the comment limiter only one.
        assert_eq!(global.snapshot().await.call_count, 2);
        assert_eq!(comment.snapshot().await.call_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn presets_match_site_thresholds() {
        let global = RateLimiter::global();
        assert_eq!(global.rate(), 40);
        assert_eq!(global.window(), Duration::from_secs(300));
        assert_eq!(
            global.mode(),
            LimitMode::Block {
                ceiling: Duration::from_secs(300)
            }
        );
        assert_eq!(RateLimiter::comment().mode(), LimitMode::FailFast);
        assert_eq!(RateLimiter::login().window(), Duration::from_secs(5));
        assert_eq!(RateLimiter::throttle().rate(), 5);
    }

    #[test]
    fn all_lists_every_limiter() {
        let limits = Limiters::default();
        let names: Vec<_> = limits.all().iter().map(|l| l.name()).collect();
        assert_eq!(names, ["global", "throttle", "comment", "login"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cloned_limiters_share_state() {
        let limits = Limiters::default();
        let shared = limits.clone();

        for _ in 0..5 {
            limits.request().await.unwrap();
        }
        // The sixth request within a second waits for the throttle window.
        let start = Instant::now();
        shared.request().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(1));

        assert_eq!(shared.global.snapshot().await.call_count, 6);
        assert_eq!(limits.throttle.snapshot().await.call_count, 1);
        assert_eq!(limits.comment.snapshot().await.call_count, 0);
    }
}
