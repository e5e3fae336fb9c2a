//! Failure classification and retry backoff
//!
//! The retry loop in the fetcher is driven by [`RetryState`]. Every transition
//! is a pure function of the current attempt, the observed outcome and the
//! current instant, so the policy can be exercised without a network or a
//! real clock.
//!
//! | Failure                              | Disposition |
//! |--------------------------------------|-------------|
//! | Timeout, connect error, reset, body  | Transient   |
//! | HTTP 403, 429, 5xx                   | Transient   |
//! | HTTP 404 and other statuses          | Fatal       |
//! | Malformed request                    | Fatal       |
//! | Unparseable response                 | Fatal       |

use crate::config::SearchConfig;
use crate::crawler::fetcher::FailureKind;
use crate::crawler::rate_limiter::jitter_sample;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Whether a failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Transient,
    Fatal,
}

/// Position of one fetch in its retry lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt `n` (1-based) is about to be issued
    Attempting(u32),
    /// Attempt `attempt` failed transiently; the next one may start at `until`
    Backoff { attempt: u32, until: Instant },
    /// The retry ceiling was reached after this many attempts
    Exhausted(u32),
    /// A fatal failure ended the fetch after this many attempts
    Aborted(u32),
    /// The fetch succeeded on this attempt
    Succeeded(u32),
}

impl RetryState {
    /// Returns true if no further attempts will be made
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Exhausted(_) | Self::Aborted(_) | Self::Succeeded(_)
        )
    }

    /// Number of attempts issued so far
    pub fn attempts(&self) -> u32 {
        match *self {
            Self::Attempting(n) => n.saturating_sub(1),
            Self::Backoff { attempt, .. } => attempt,
            Self::Exhausted(n) | Self::Aborted(n) | Self::Succeeded(n) => n,
        }
    }
}

/// Retry ceiling and exponential backoff parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub retry_ceiling: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            retry_ceiling: config.retry_ceiling,
            backoff_base: config.backoff_base,
            backoff_cap: config.backoff_cap,
            jitter: config.jitter,
        }
    }

    /// Upper bound on attempts for a single fetch
    pub fn max_attempts(&self) -> u32 {
        self.retry_ceiling.saturating_add(1)
    }

    /// Classifies a failure as transient or fatal
    pub fn classify(&self, kind: &FailureKind) -> Disposition {
        match kind {
            FailureKind::Timeout
            | FailureKind::Connect(_)
            | FailureKind::Network(_)
            | FailureKind::Body(_) => Disposition::Transient,
            FailureKind::Status(code) => match code {
                403 | 429 | 500..=599 => Disposition::Transient,
                _ => Disposition::Fatal,
            },
            FailureKind::InvalidRequest(_) | FailureKind::Unparseable(_) => Disposition::Fatal,
        }
    }

    /// Backoff before jitter: `min(cap, base * 2^(attempt - 1))`
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }

    /// Backoff after `attempt` failed, including a uniform jitter sample
    pub fn next_delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        self.base_delay(attempt) + jitter_sample(rng, self.jitter)
    }

    /// Transition for a successful attempt
    pub fn on_success(&self, attempt: u32) -> RetryState {
        RetryState::Succeeded(attempt)
    }

    /// Transition for a failed attempt
    ///
    /// # Arguments
    ///
    /// * `attempt` - The attempt that just failed (1-based)
    /// * `kind` - What went wrong
    /// * `now` - The current instant
    /// * `delay` - Backoff to apply if the failure is retried
    pub fn on_failure(
        &self,
        attempt: u32,
        kind: &FailureKind,
        now: Instant,
        delay: Duration,
    ) -> RetryState {
        match self.classify(kind) {
            Disposition::Fatal => RetryState::Aborted(attempt),
            Disposition::Transient if attempt >= self.max_attempts() => {
                RetryState::Exhausted(attempt)
            }
            Disposition::Transient => RetryState::Backoff {
                attempt,
                until: now + delay,
            },
        }
    }

    /// Transition once a backoff period has elapsed
    pub fn on_backoff_elapsed(&self, state: RetryState) -> RetryState {
        match state {
            RetryState::Backoff { attempt, .. } => RetryState::Attempting(attempt + 1),
            other => other,
        }
    }
}
