//! Rate-limit backoff as a client wrapper.
//!
//! Only [`LlmError::RateLimited`] is retried. Everything else is returned
//! to the caller on the first attempt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use rand::Rng;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::LlmError;

use super::{LlmClient, Response, ResponseRequest};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay used as +/- jitter.
    pub jitter: f64,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            jitter: cfg.jitter.clamp(0.0, 1.0),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based). A provider-supplied
    /// retry-after wins over the computed backoff, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(after) = retry_after {
            return after.min(self.max_delay);
        }
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(20));
        let capped_ms = exp_ms.min(self.max_delay.as_millis() as u64);

        let jitter_range = (capped_ms as f64 * self.jitter) as i64;
        let jitter_ms = if jitter_range > 0 {
            rand::rng().random_range(-jitter_range..=jitter_range)
        } else {
            0
        };
        Duration::from_millis((capped_ms as i64 + jitter_ms).max(0) as u64)
    }
}

pub struct RetryingClient {
    inner: Arc<dyn LlmClient>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn LlmClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn with_backoff<T, F, Fut>(&self, op_name: &'static str, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, LlmError>> + Send,
        T: Send,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Err(LlmError::RateLimited { retry_after }) if attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt, retry_after);
                    attempt += 1;
                    counter!("llm_rate_limited_total", "op" => op_name).increment(1);
                    warn!(
                        target: "llm::retry",
                        op = op_name,
                        attempt,
                        max = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl LlmClient for RetryingClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String, LlmError> {
        self.with_backoff("chat", || self.inner.chat(system, user))
            .await
    }

    async fn respond(&self, request: &ResponseRequest) -> Result<Response, LlmError> {
        self.with_backoff("respond", || self.inner.respond(request))
            .await
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            jitter: 0.0,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.delay_for(0, None), Duration::from_millis(100));
        assert_eq!(p.delay_for(1, None), Duration::from_millis(200));
        assert_eq!(p.delay_for(2, None), Duration::from_millis(400));
        assert_eq!(p.delay_for(6, None), Duration::from_millis(1_000));
    }

    #[test]
    fn retry_after_is_honoured_but_capped() {
        let p = policy();
        assert_eq!(
            p.delay_for(0, Some(Duration::from_millis(300))),
            Duration::from_millis(300)
        );
        assert_eq!(
            p.delay_for(0, Some(Duration::from_secs(60))),
            Duration::from_millis(1_000)
        );
    }

    #[test]
    fn jitter_stays_in_range() {
        let p = RetryPolicy {
            jitter: 0.5,
            ..policy()
        };
        for _ in 0..50 {
            let d = p.delay_for(1, None).as_millis();
            assert!((100..=300).contains(&d), "delay {d} out of range");
        }
    }
}
