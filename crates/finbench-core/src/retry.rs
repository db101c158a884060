//! Retry decisions for inference calls.
//!
//! `RetryPolicy::decide` is pure: attempt index and error in, decision out.
//! `RetryState` carries the per-call bookkeeping the client loop needs.

use std::time::Duration;

use crate::error::{AttemptRecord, CallFailed, InferenceError};

/// How long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `min(base * 2^attempt, cap)`.
    Exponential { base: Duration, cap: Duration },
    Fixed(Duration),
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Exponential { base, cap } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(cap).min(cap)
            }
            Backoff::Fixed(d) => d,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first one included.
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// When false, 400/401/403/404/422 end the call immediately.
    pub retry_client_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::default(),
            retry_client_errors: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_retry_client_errors(mut self, retry: bool) -> Self {
        self.retry_client_errors = retry;
        self
    }

    /// Decide what to do after `attempt` (0-based) failed with `error`.
    pub fn decide(&self, attempt: u32, error: &InferenceError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::GiveUp;
        }
        if !self.retry_client_errors && error.is_permanent_client_error() {
            return RetryDecision::GiveUp;
        }
        if attempt.saturating_add(1) >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.backoff.delay(attempt))
    }
}

/// Per-call retry bookkeeping. Created when a call starts, dropped when it
/// succeeds or is turned into a [`CallFailed`].
#[derive(Debug)]
pub struct RetryState<'a> {
    policy: &'a RetryPolicy,
    attempt: u32,
    history: Vec<AttemptRecord>,
}

impl<'a> RetryState<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            history: Vec::new(),
        }
    }

    /// Zero-based index of the attempt in progress.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Attempts made so far, counting the one in progress.
    pub fn attempts_made(&self) -> u32 {
        self.attempt + 1
    }

    pub fn last_error(&self) -> Option<&InferenceError> {
        self.history.last().map(|r| &r.error)
    }

    /// Records a failed attempt and advances the counter when the policy
    /// allows another one.
    pub fn record_failure(&mut self, error: InferenceError) -> RetryDecision {
        let decision = self.policy.decide(self.attempt, &error);
        self.history.push(AttemptRecord {
            attempt: self.attempt,
            error,
        });
        if let RetryDecision::RetryAfter(_) = decision {
            self.attempt += 1;
        }
        decision
    }

    pub fn into_failure(self) -> CallFailed {
        let attempts = self.attempt + 1;
        let last_error = self
            .last_error()
            .cloned()
            .unwrap_or_else(|| InferenceError::InvalidRequest("no attempt recorded".into()));
        CallFailed {
            attempts,
            last_error,
            history: self.history,
        }
    }
}
