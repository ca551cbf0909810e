use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use tripweave_core::config::RetryConfig;
use tripweave_core::error::{Result, TripweaveError};
use tripweave_core::traits::ReasoningClient;

/// A reasoning client that retries failed requests and falls back to alternative providers.
pub struct RetryingClient {
    primary: Box<dyn ReasoningClient>,
    fallbacks: Vec<(String, Box<dyn ReasoningClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    /// `fallbacks` pairs a label (the model id) with each alternative client.
    pub fn new(
        primary: Box<dyn ReasoningClient>,
        fallbacks: Vec<(String, Box<dyn ReasoningClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

fn is_retryable(e: &TripweaveError) -> bool {
    match e {
        TripweaveError::Reasoning(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("504")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        TripweaveError::ReasoningParse(_) => true,
        _ => false,
    }
}

/// Exponential backoff capped at `max_backoff_ms`, with 0.8x–1.2x jitter.
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl ReasoningClient for RetryingClient {
    fn complete(&self, system: &str, prompt: &str) -> BoxFuture<'_, Result<String>> {
        let system = system.to_string();
        let prompt = prompt.to_string();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            // Try primary with retries
            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self.primary.complete(&system, &prompt).await {
                    Ok(text) => return Ok(text),
                    Err(e) => {
                        if is_retryable(&e) && attempt < max_retries {
                            let backoff = calculate_backoff(attempt, &self.retry_config);
                            warn!(
                                attempt = attempt + 1,
                                max_retries,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Retrying reasoning request"
                            );
                            tokio::time::sleep(backoff).await;
                            last_err = Some(e);
                            continue;
                        }
                        last_err = Some(e);
                        break;
                    }
                }
            }

            // Primary exhausted, try fallbacks
            if !self.fallbacks.is_empty() {
                info!("Primary reasoning provider exhausted, trying fallback models");
            }
            for (label, client) in &self.fallbacks {
                match client.complete(&system, &prompt).await {
                    Ok(text) => {
                        info!(model = %label, "Fell back to alternative model");
                        return Ok(text);
                    }
                    Err(e) => {
                        warn!(model = %label, error = %e, "Fallback model also failed");
                        continue;
                    }
                }
            }

            Err(last_err
                .unwrap_or_else(|| TripweaveError::Reasoning("All providers failed".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Flaky {
        failures: usize,
        calls: Arc<AtomicUsize>,
        error: fn() -> TripweaveError,
    }

    impl ReasoningClient for Flaky {
        fn complete(&self, _system: &str, _prompt: &str) -> BoxFuture<'_, Result<String>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < self.failures {
                    Err((self.error)())
                } else {
                    Ok("ok".to_string())
                }
            })
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 5,
            initial_backoff_ms: 1000,
            max_backoff_ms: 4000,
        };
        let d = calculate_backoff(10, &config);
        assert!(d <= Duration::from_millis(4800));
        assert!(d >= Duration::from_millis(3200));
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                failures: 2,
                calls: calls.clone(),
                error: || TripweaveError::Reasoning("HTTP 503: busy".into()),
            }),
            vec![],
            fast_retry(3),
        );
        assert_eq!(client.complete("s", "p").await.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_goes_to_fallback() {
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                failures: usize::MAX,
                calls: primary_calls.clone(),
                error: || TripweaveError::Reasoning("HTTP 401: unauthorized".into()),
            }),
            vec![(
                "backup".to_string(),
                Box::new(Flaky {
                    failures: 0,
                    calls: fallback_calls.clone(),
                    error: || TripweaveError::Reasoning("unused".into()),
                }) as Box<dyn ReasoningClient>,
            )],
            fast_retry(3),
        );
        assert_eq!(client.complete("s", "p").await.unwrap(), "ok");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_providers_fail_returns_last_error() {
        let client = RetryingClient::new(
            Box::new(Flaky {
                failures: usize::MAX,
                calls: Arc::new(AtomicUsize::new(0)),
                error: || TripweaveError::Reasoning("HTTP 502: bad gateway".into()),
            }),
            vec![],
            fast_retry(1),
        );
        let err = client.complete("s", "p").await.unwrap_err();
        assert!(err.to_string().contains("502"));
    }
}
