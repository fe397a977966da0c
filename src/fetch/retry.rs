// src/fetch/retry.rs

use std::time::Duration;

use crate::config::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    /// How long to wait before the next attempt; zero when not retrying.
    pub next_delay: Duration,
}

/// Decide what to do after attempt number `attempt` (1-based) failed.
///
/// The first retry waits `policy.base_delay`; every later one waits twice the
/// previous delay. No retry once `policy.max_attempts` attempts have been made.
pub fn next_retry(policy: &RetryPolicy, attempt: u32, prior_delay: Option<Duration>) -> RetryDecision {
    if attempt >= policy.max_attempts {
        return RetryDecision {
            retry: false,
            next_delay: Duration::ZERO,
        };
    }
    let next_delay = match prior_delay {
        None => policy.base_delay,
        Some(d) => d.saturating_mul(2),
    };
    RetryDecision {
        retry: true,
        next_delay,
    }
}
