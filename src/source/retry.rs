// src/source/retry.rs
use std::fmt;
use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Bounded retry with linear backoff (`attempt * backoff_step`) and a hard
/// per-attempt timeout. A timed-out attempt counts as a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub per_attempt_timeout: Duration,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            per_attempt_timeout: Duration::from_secs(7),
            backoff_step: Duration::from_millis(250),
        }
    }
}

/// Marks an error that another attempt cannot fix (bad payload, zero reserve).
#[derive(Debug)]
pub struct Permanent(pub String);

impl fmt::Display for Permanent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Permanent {}

pub fn permanent(msg: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(Permanent(msg.into()))
}

pub fn is_permanent(e: &anyhow::Error) -> bool {
    e.downcast_ref::<Permanent>().is_some()
}

impl RetryPolicy {
    pub fn with_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn with_timeout(mut self, t: Duration) -> Self {
        self.per_attempt_timeout = t;
        self
    }

    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    /// Pause after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent.
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tracing::debug!(source = label, attempt, max = attempts, "retrying");
            }
            let err = match tokio::time::timeout(self.per_attempt_timeout, op(attempt)).await {
                Ok(Ok(v)) => return Ok(v),
                Ok(Err(e)) if is_permanent(&e) => {
                    tracing::debug!(source = label, attempt, error = %e, "permanent failure");
                    return Err(e);
                }
                Ok(Err(e)) => e,
                Err(_) => anyhow!("attempt timed out after {:?}", self.per_attempt_timeout),
            };
            tracing::debug!(source = label, attempt, error = %err, "attempt failed");
            last_err = Some(err);

            if attempt < attempts {
                tokio::time::sleep(self.delay_after(attempt)).await;
            }
        }

        let err = last_err.unwrap_or_else(|| anyhow!("no attempt was made"));
        Err(err.context(format!("{label}: exhausted {attempts} attempts")))
    }
}
