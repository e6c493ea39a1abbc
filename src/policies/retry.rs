//! # Retry policy for source loading.
//!
//! When the [`SourceLoader`](crate::SourceLoader) fails, the controller asks the
//! `load_error` decision hook whether to try again. [`RetryPolicy`] bounds how many
//! times that answer is honoured and how long to wait between attempts.
//!
//! The delay before retry `n` (0-indexed) is `first × factor^n`, clamped to `max`,
//! then jittered. The base is derived from the retry index only, so jitter never
//! feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use mountvisor::{JitterPolicy, RetryPolicy};
//!
//! let retry = RetryPolicy {
//!     max_retries: 3,
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(1),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(retry.delay(0), Duration::from_millis(100));
//! assert_eq!(retry.delay(2), Duration::from_millis(400));
//! assert_eq!(retry.delay(10), Duration::from_secs(1));
//! assert!(retry.allows(2));
//! assert!(!retry.allows(3));
//! ```

use std::time::Duration;

use super::jitter::JitterPolicy;

/// Bounded, spaced-out retries.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt (`0` = never retry).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Multiplicative growth factor.
    pub factor: f64,
    /// Randomization of the computed delay.
    pub jitter: JitterPolicy,
}

impl Default for RetryPolicy {
    /// Returns:
    /// - `max_retries = 0` (the hook must opt in and the host must allow it);
    /// - `first = 100ms`, `factor = 2.0`, `max = 5s`;
    /// - no jitter.
    fn default() -> Self {
        Self {
            max_retries: 0,
            first: Duration::from_millis(100),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately up to `max_retries` times.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            first: Duration::ZERO,
            max: Duration::ZERO,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Whether retry number `retry` (0-indexed) is still within budget.
    #[inline]
    pub fn allows(&self, retry: u32) -> bool {
        retry < self.max_retries
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = retry.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}
