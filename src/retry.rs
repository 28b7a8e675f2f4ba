//! Retrying a single statement against a service that is still warming up.
//!
//! A freshly reachable database port does not mean the server accepts
//! statements yet, so the first few attempts are expected to fail.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BoxError, RetryError};

/// Attempt count and backoff shape for [`retry_exec_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub max_attempts: u32,
    /// Sleep after the first failure.
    pub base_interval: Duration,
    /// Factor applied to the sleep after every failure.
    pub multiplier: u32,
    /// Upper bound for a single sleep.
    pub max_interval: Option<Duration>,
}

impl RetryBudget {
    pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_millis(100);

    /// 100ms doubling backoff with no ceiling.
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_interval: Self::DEFAULT_BASE_INTERVAL,
            multiplier: 2,
            max_interval: None,
        }
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        let next = current.saturating_mul(self.multiplier);
        match self.max_interval {
            Some(ceiling) => next.min(ceiling),
            None => next,
        }
    }

    fn first_interval(&self) -> Duration {
        match self.max_interval {
            Some(ceiling) => self.base_interval.min(ceiling),
            None => self.base_interval,
        }
    }
}

/// Something that can run a SQL statement.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    type Output: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn execute(&self, statement: &str) -> Result<Self::Output, Self::Error>;
}

/// Run `statement` up to `max_attempts` times, sleeping 100ms after the first
/// failure and doubling the sleep after each further one.
pub async fn retry_exec<E>(executor: &E, statement: &str, max_attempts: u32) -> Result<E::Output, RetryError>
where
    E: StatementExecutor + ?Sized,
{
    retry_exec_with(executor, statement, &RetryBudget::attempts(max_attempts)).await
}

/// Run `statement` until it succeeds or `budget` is spent.
///
/// There is no sleep after the final failed attempt.
pub async fn retry_exec_with<E>(
    executor: &E,
    statement: &str,
    budget: &RetryBudget,
) -> Result<E::Output, RetryError>
where
    E: StatementExecutor + ?Sized,
{
    if budget.max_attempts == 0 {
        return Err(RetryError::NoAttempts);
    }

    let mut interval = budget.first_interval();
    let mut attempt = 0;
    loop {
        attempt += 1;
        match executor.execute(statement).await {
            Ok(output) => {
                if attempt > 1 {
                    tracing::debug!("Statement succeeded after {} attempts", attempt);
                }
                return Ok(output);
            }
            Err(e) if attempt >= budget.max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: Box::new(e) as BoxError,
                });
            }
            Err(e) => {
                tracing::warn!(
                    "Statement failed (attempt {}/{}): {}. Retrying in {:?}",
                    attempt,
                    budget.max_attempts,
                    e,
                    interval
                );
                tokio::time::sleep(interval).await;
                interval = budget.next_interval(interval);
            }
        }
    }
}
