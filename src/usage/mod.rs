//! Usage accounting and the shared throttling deadline.
//!
//! One [`UsageTracker`] is shared (via `Arc`) by every invoker that talks to
//! the same API key. Only real network calls touch it; cache hits never do.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::types::TokenUsage;

/// Longest throttle honoured from a single signal. Larger `Retry-After`
/// hints are clamped to this so the deadline stays representable.
pub const MAX_THROTTLE_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Read-only view of the tracker for status endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub total_calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub is_rate_limited: bool,
    /// Whole seconds (rounded up) until the throttle lifts; 0 when not limited.
    pub resets_in_seconds: u64,
}

#[derive(Debug, Default)]
struct State {
    total_calls: u64,
    prompt_tokens: u64,
    completion_tokens: u64,
    /// Absolute time before which no new attempt may start.
    rate_limited_until: Option<Instant>,
}

/// Usage counters shared by every invoker holding the same `Arc`.
///
/// The lock is only held for plain field updates and never across an await.
#[derive(Debug, Default)]
pub struct UsageTracker {
    state: Mutex<State>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Account one completed network call.
    pub fn record_call(&self, usage: &TokenUsage) {
        let mut st = self.lock();
        st.total_calls = st.total_calls.saturating_add(1);
        st.prompt_tokens = st.prompt_tokens.saturating_add(usage.prompt_tokens);
        st.completion_tokens = st.completion_tokens.saturating_add(usage.completion_tokens);
    }

    /// Record an upstream throttle lasting `wait` from now.
    ///
    /// The deadline only moves forward: an earlier, shorter signal cannot
    /// cut a longer one short. `wait` is clamped to [`MAX_THROTTLE_WAIT`].
    /// Returns the effective deadline.
    pub fn note_throttled(&self, wait: Duration) -> Instant {
        let now = Instant::now();
        let candidate = now
            .checked_add(wait.min(MAX_THROTTLE_WAIT))
            .unwrap_or(now);
        let mut st = self.lock();
        let until = match st.rate_limited_until {
            Some(existing) if existing > candidate => existing,
            _ => candidate,
        };
        st.rate_limited_until = Some(until);
        until
    }

    /// The active throttle deadline, if it is still in the future.
    pub fn rate_limited_until(&self) -> Option<Instant> {
        let st = self.lock();
        st.rate_limited_until.filter(|until| *until > Instant::now())
    }

    /// Drop the throttle deadline; used by configuration reload.
    pub fn clear_rate_limit(&self) {
        self.lock().rate_limited_until = None;
    }

    /// Zero every counter and drop the throttle deadline.
    pub fn reset(&self) {
        *self.lock() = State::default();
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let st = self.lock();
        let now = Instant::now();
        let remaining = st
            .rate_limited_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default();
        UsageSnapshot {
            total_calls: st.total_calls,
            prompt_tokens: st.prompt_tokens,
            completion_tokens: st.completion_tokens,
            total_tokens: st.prompt_tokens.saturating_add(st.completion_tokens),
            is_rate_limited: !remaining.is_zero(),
            resets_in_seconds: ceil_secs(remaining),
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
