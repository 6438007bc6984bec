use std::time::Duration;

use crate::config::InvokerConfig;
use crate::error::AttemptFailure;
use crate::usage::MAX_THROTTLE_WAIT;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry { delay: Duration },
    Fail,
}

/// Retry policy as a pure function of (failure, attempt number).
///
/// Fatal outcomes never reach the policy; the invoker fails them before
/// asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first.
    pub max_retries: u32,
    pub base: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &InvokerConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base: cfg.backoff_base,
            max_backoff: cfg.max_backoff,
        }
    }

    /// Wait after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(exp).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max_backoff)
    }

    /// `attempt` is 1-based: the first failure is attempt 1.
    pub fn decide(&self, failure: &AttemptFailure, attempt: u32) -> Decision {
        if attempt >= self.max_retries {
            return Decision::Fail;
        }
        let delay = match failure {
            // An explicit server hint wins over the computed schedule.
            AttemptFailure::Throttled {
                retry_after: Some(wait),
                ..
            } => (*wait).min(MAX_THROTTLE_WAIT),
            _ => self.backoff_delay(attempt),
        };
        Decision::Retry { delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&InvokerConfig::default())
    }
}
