//! Retry wrapper for LLM clients.
//!
//! Retries transient request failures with capped exponential backoff. The
//! scheduler's decision timeout still bounds the whole exchange; keep the
//! retry budget well below it.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::infrastructure::ports::{LlmError, LlmPort, LlmRequest, LlmResponse, RandomPort};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Random spread around each delay, in percent
    pub jitter_percent: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 250,
            max_delay_ms: 2_000,
            jitter_percent: 20,
        }
    }
}

pub struct ResilientLlmClient {
    inner: Arc<dyn LlmPort>,
    random: Arc<dyn RandomPort>,
    config: RetryConfig,
}

impl ResilientLlmClient {
    pub fn new(inner: Arc<dyn LlmPort>, random: Arc<dyn RandomPort>, config: RetryConfig) -> Self {
        Self {
            inner,
            random,
            config,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .config
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.config.max_delay_ms);

        let spread = i32::try_from(self.config.jitter_percent).unwrap_or(0);
        let percent = 100 + self.random.gen_range(-spread, spread);
        let jittered = capped.saturating_mul(u64::try_from(percent).unwrap_or(100)) / 100;
        Duration::from_millis(jittered)
    }

    /// Client errors will fail the same way again.
    fn is_retryable(error: &LlmError) -> bool {
        match error {
            LlmError::RequestFailed(msg) => !["400", "401", "403", "404"]
                .iter()
                .any(|status| msg.contains(status)),
            LlmError::InvalidResponse(_) => false,
        }
    }
}

#[async_trait]
impl LlmPort for ResilientLlmClient {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.generate(request.clone()).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(attempt = attempt + 1, "LLM request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) if attempt < self.config.max_retries && Self::is_retryable(&e) => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "LLM request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(attempts = attempt + 1, error = %e, "LLM request failed");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{FinishReason, MockLlmPort, MockRandomPort};
    use mockall::Sequence;

    fn no_jitter() -> Arc<MockRandomPort> {
        let mut random = MockRandomPort::new();
        random.expect_gen_range().returning(|_, _| 0);
        Arc::new(random)
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_percent: 0,
        }
    }

    fn ok() -> LlmResponse {
        LlmResponse {
            content: "{\"action\":\"idle\"}".to_string(),
            finish_reason: FinishReason::Stop,
        }
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let mut llm = MockLlmPort::new();
        let mut seq = Sequence::new();
        llm.expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(LlmError::RequestFailed("connection reset".into())));
        llm.expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ok()));

        let client = ResilientLlmClient::new(Arc::new(llm), no_jitter(), fast());
        assert!(client.generate(LlmRequest::new(vec![])).await.is_ok());
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let mut llm = MockLlmPort::new();
        llm.expect_generate()
            .times(3)
            .returning(|_| Err(LlmError::RequestFailed("timeout".into())));

        let client = ResilientLlmClient::new(Arc::new(llm), no_jitter(), fast());
        assert!(client.generate(LlmRequest::new(vec![])).await.is_err());
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let mut llm = MockLlmPort::new();
        llm.expect_generate()
            .times(1)
            .returning(|_| Err(LlmError::RequestFailed("HTTP 401: unauthorized".into())));

        let client = ResilientLlmClient::new(Arc::new(llm), no_jitter(), fast());
        assert!(client.generate(LlmRequest::new(vec![])).await.is_err());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let client = ResilientLlmClient::new(
            Arc::new(MockLlmPort::new()),
            no_jitter(),
            RetryConfig {
                max_retries: 5,
                base_delay_ms: 100,
                max_delay_ms: 500,
                jitter_percent: 0,
            },
        );
        assert_eq!(client.delay_for(1), Duration::from_millis(100));
        assert_eq!(client.delay_for(2), Duration::from_millis(200));
        assert_eq!(client.delay_for(3), Duration::from_millis(400));
        assert_eq!(client.delay_for(4), Duration::from_millis(500));
    }

    #[test]
    fn jitter_spreads_the_delay() {
        let mut random = MockRandomPort::new();
        random.expect_gen_range().returning(|_, max| max);
        let client = ResilientLlmClient::new(Arc::new(MockLlmPort::new()), Arc::new(random), RetryConfig::default());
        assert_eq!(client.delay_for(1), Duration::from_millis(300));
    }
}
