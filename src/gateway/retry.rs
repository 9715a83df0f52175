// src/gateway/retry.rs — Bounded retry with backoff for generation calls
//
// Retries transient backend failures (rate limits, 5xx, timeouts) a small
// bounded number of times. Malformed output and client errors surface
// immediately — a bad prompt does not improve by repetition.

use std::future::Future;
use std::time::Duration;

use crate::infra::errors::AgentError;

const MAX_RETRIES: u32 = 2;
const INITIAL_DELAY_MS: u64 = 1_000;
const BACKOFF_FACTOR: f64 = 2.0;
const MAX_DELAY_MS: u64 = 15_000;
const JITTER_FRACTION: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_delay: Duration::from_millis(INITIAL_DELAY_MS),
            backoff_factor: BACKOFF_FACTOR,
            max_delay: Duration::from_millis(MAX_DELAY_MS),
            jitter_fraction: JITTER_FRACTION,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Run `op`, retrying retriable errors up to `max_retries` times.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, AgentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_retriable() || attempt == self.max_retries {
                        return Err(e);
                    }

                    let delay = self.delay_for_attempt(attempt, rate_limit_delay(&e));
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying generation after error: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(AgentError::Generation {
            backend: "unknown".into(),
            message: "all retries exhausted".into(),
            retriable: false,
        }))
    }

    /// Delay for a given retry attempt (0-indexed). A server-provided
    /// rate-limit hint wins over exponential backoff.
    fn delay_for_attempt(&self, attempt: u32, rate_limit: Option<Duration>) -> Duration {
        if let Some(hint) = rate_limit {
            return hint + Duration::from_millis(100);
        }

        let base_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(attempt as i32);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);
        let final_ms = (capped_ms * deterministic_jitter(attempt, self.jitter_fraction)).max(100.0);
        Duration::from_millis(final_ms as u64)
    }
}

fn rate_limit_delay(error: &AgentError) -> Option<Duration> {
    match error {
        AgentError::RateLimited { retry_after_ms, .. } if *retry_after_ms > 0 => {
            Some(Duration::from_millis(*retry_after_ms))
        }
        _ => None,
    }
}

/// Deterministic jitter keeps retry timing reproducible in tests.
/// Returns a multiplier in [1 - fraction, 1 + fraction].
fn deterministic_jitter(attempt: u32, fraction: f64) -> f64 {
    let hash = (attempt.wrapping_mul(2654435761)) as f64 / u32::MAX as f64;
    1.0 + fraction * (2.0 * hash - 1.0)
}
