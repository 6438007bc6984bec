//! Scripted external API shared by the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use resilient_llm::transport::{ApiCall, CallOutcome, ExternalApi};
use resilient_llm::TokenUsage;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// One scripted reaction to a call.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(CallOutcome),
    /// Reply after a delay (simulates a slow upstream).
    After(Duration, CallOutcome),
    /// Never reply; only a timeout or cancellation ends the call.
    Hang,
}

/// Plays back a fixed script, then repeats `fallback` forever.
pub struct ScriptedApi {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: Mutex<Vec<(Instant, ApiCall)>>,
}

impl ScriptedApi {
    pub fn new(steps: Vec<Step>, fallback: Step) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn always(step: Step) -> Arc<Self> {
        Self::new(Vec::new(), step)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    /// Yield until at least `n` calls have been observed.
    pub async fn wait_for_calls(&self, n: usize) {
        while self.call_count() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl ExternalApi for ScriptedApi {
    async fn call(&self, call: &ApiCall) -> CallOutcome {
        self.calls.lock().unwrap().push((Instant::now(), call.clone()));
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match step {
            Step::Reply(outcome) => outcome,
            Step::After(delay, outcome) => {
                tokio::time::sleep(delay).await;
                outcome
            }
            Step::Hang => std::future::pending().await,
        }
    }
}

pub fn ok(text: &str) -> Step {
    Step::Reply(CallOutcome::success(text, TokenUsage::new(10, 5)))
}

pub fn ok_after(delay: Duration, text: &str) -> Step {
    Step::After(delay, CallOutcome::success(text, TokenUsage::new(10, 5)))
}

pub fn transient() -> Step {
    Step::Reply(CallOutcome::Transient {
        status: Some(503),
        message: "service unavailable".into(),
    })
}

pub fn throttled(secs: u64) -> Step {
    Step::Reply(CallOutcome::throttled(Some(Duration::from_secs(secs))))
}
