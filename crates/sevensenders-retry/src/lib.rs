//! Re-authentication retry policy for the Seven Senders API client.
//!
//! A request answered with `401 Unauthorized` is replayed after fetching a
//! fresh token. Replays draw from an [`AttemptBudget`] that is shared by all
//! requests issued through the same client, so a persistently rejected key
//! cannot loop forever. This crate provides:
//! - the [`ReauthPolicy`] configuration (budget size, delay strategy, reset rule)
//! - [`calculate_delay`] for the pause before each re-authentication
//! - the [`AttemptBudget`] counter itself
//!
//! # Example
//!
//! ```
//! use sevensenders_retry::{AttemptBudget, ReauthPolicy, calculate_delay};
//! use std::time::Duration;
//!
//! let policy = ReauthPolicy::default();
//! let mut budget = AttemptBudget::new(policy.max_attempts);
//!
//! while let Some(attempt) = budget.try_consume() {
//!     assert_eq!(calculate_delay(&policy, attempt), Duration::ZERO);
//! }
//! assert!(budget.is_exhausted());
//! assert_eq!(budget.used(), 5);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of re-authentications a client may perform.
pub const DEFAULT_MAX_REAUTH_ATTEMPTS: u32 = 5;

/// Strategy type for the delay before a re-authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategyType {
    /// No delay - re-authenticate immediately (default)
    #[default]
    Immediate,
    /// Exponential backoff: delay doubles each attempt
    Exponential,
    /// Linear backoff: delay increases linearly each attempt
    Linear,
    /// Constant delay: same delay every attempt
    Constant,
}

/// Configuration of the 401 re-authentication loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReauthPolicy {
    /// Strategy type for calculating delay between re-authentications.
    #[serde(default)]
    pub strategy: RetryStrategyType,
    /// Maximum number of re-authentications per budget.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for backoff calculations.
    #[serde(default = "default_base_delay")]
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Maximum delay cap for backoff.
    #[serde(default = "default_max_delay")]
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Jitter factor for randomized delays (0.0 = no jitter, 1.0 = full jitter).
    #[serde(default)]
    pub jitter: f64,
    /// Refill the budget after a successful authenticated response. When
    /// `false` the budget only ever shrinks for the lifetime of the client.
    #[serde(default = "default_reset_on_success")]
    pub reset_on_success: bool,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_REAUTH_ATTEMPTS
}

fn default_base_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_reset_on_success() -> bool {
    true
}

impl Default for ReauthPolicy {
    fn default() -> Self {
        Self {
            strategy: RetryStrategyType::Immediate,
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter: 0.0,
            reset_on_success: default_reset_on_success(),
        }
    }
}

/// Calculate the delay before re-authentication attempt `attempt` (1-indexed).
///
/// ```
/// use sevensenders_retry::{ReauthPolicy, RetryStrategyType, calculate_delay};
/// use std::time::Duration;
///
/// let policy = ReauthPolicy {
///     strategy: RetryStrategyType::Exponential,
///     base_delay: Duration::from_secs(1),
///     max_delay: Duration::from_secs(60),
///     ..Default::default()
/// };
///
/// assert_eq!(calculate_delay(&policy, 1), Duration::from_secs(1));
/// assert_eq!(calculate_delay(&policy, 3), Duration::from_secs(4));
/// ```
pub fn calculate_delay(policy: &ReauthPolicy, attempt: u32) -> Duration {
    let delay = match policy.strategy {
        RetryStrategyType::Immediate => Duration::ZERO,
        RetryStrategyType::Exponential => {
            let pow = attempt.saturating_sub(1).min(16);
            policy.base_delay.saturating_mul(2_u32.saturating_pow(pow))
        }
        RetryStrategyType::Linear => policy.base_delay.saturating_mul(attempt),
        RetryStrategyType::Constant => policy.base_delay,
    };

    let capped = delay.min(policy.max_delay);

    if policy.jitter > 0.0 && !capped.is_zero() {
        apply_jitter(capped, policy.jitter)
    } else {
        capped
    }
}

/// Jitter factor of 0.5 means delay * (0.5 to 1.5).
fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    use rand::Rng;

    let jitter = jitter.min(1.0);
    let jitter_range = 2.0 * jitter;
    let mut rng = rand::thread_rng();
    let random_value: f64 = rng.r#gen();
    let random_factor = 1.0 - jitter + (random_value * jitter_range);
    let millis = (delay.as_millis() as f64 * random_factor).round() as u64;
    Duration::from_millis(millis)
}

/// Cumulative attempt counter with a hard cap.
///
/// Unlike a per-call loop counter, a budget is meant to be owned by a
/// long-lived client and consulted by every request it sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptBudget {
    limit: u32,
    used: u32,
}

impl AttemptBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, used: 0 }
    }

    /// Take one attempt from the budget.
    ///
    /// Returns the 1-indexed attempt number, or `None` once the cap has been
    /// reached.
    pub fn try_consume(&mut self) -> Option<u32> {
        if self.used >= self.limit {
            return None;
        }
        self.used += 1;
        Some(self.used)
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.limit
    }

    /// Refill the budget.
    pub fn reset(&mut self) {
        self.used = 0;
    }
}

impl Default for AttemptBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REAUTH_ATTEMPTS)
    }
}
