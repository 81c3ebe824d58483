use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheManager;
use crate::error::FetchError;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_millis(1000);

/// How many times to retry, how long to wait between attempts, and how long a
/// single attempt may take. Backoff grows linearly: `attempt × backoff_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_step: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_step: DEFAULT_BACKOFF_STEP,
            timeout,
        }
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(10))
    }
}

/// Single entry point for provider HTTP calls: cache first, then network
/// with retries, then write-through to both cache tiers.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    caches: Arc<CacheManager>,
}

impl HttpFetcher {
    pub fn new(caches: Arc<CacheManager>) -> Self {
        Self {
            client: Client::new(),
            caches,
        }
    }

    pub fn with_client(client: Client, caches: Arc<CacheManager>) -> Self {
        Self { client, caches }
    }

    pub fn caches(&self) -> &Arc<CacheManager> {
        &self.caches
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns the cached payload for `cache_key` when one is fresh, otherwise
    /// fetches `url`, caches the JSON for `ttl`, and returns it parsed as `T`.
    ///
    /// Only terminal failures (all attempts used) are returned.
    pub async fn fetch_with_cache<T: DeserializeOwned>(
        &self,
        url: &Url,
        cache_key: &str,
        ttl: Duration,
        policy: &RetryPolicy,
    ) -> Result<T, FetchError> {
        if let Some(cached) = self.caches.books.get_persisted(cache_key).await {
            match serde_json::from_value::<T>(cached) {
                Ok(parsed) => {
                    tracing::debug!(cache_key, "API cache hit");
                    return Ok(parsed);
                }
                Err(err) => {
                    tracing::warn!(cache_key, error = %err, "cached API payload no longer parses; refetching");
                    self.caches.books.remove_persisted(cache_key).await;
                }
            }
        }

        let (parsed, raw) = self.fetch_json::<T>(url, policy).await?;
        self.caches.books.set_persisted(cache_key, raw, ttl).await;
        Ok(parsed)
    }

    /// Network-only fetch with the retry policy applied. Returns the parsed
    /// value and the raw JSON it came from.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        policy: &RetryPolicy,
    ) -> Result<(T, Value), FetchError> {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = policy.delay_before(attempt);
                tracing::info!(%url, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
                tokio::time::sleep(delay).await;
            }

            match self.attempt::<T>(url, policy.timeout).await {
                Ok(result) => return Ok(result),
                Err(err) if attempt >= policy.max_retries => {
                    tracing::error!(%url, attempts = attempt + 1, error = %err, "request failed; giving up");
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(%url, attempt, error = %err, "request attempt failed");
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> Result<(T, Value), FetchError> {
        self.caches.record_network_call();
        let url_text = url.to_string();
        let map_err = |err: reqwest::Error| {
            if err.is_timeout() {
                FetchError::Timeout {
                    url: url_text.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                }
            } else {
                FetchError::Transport {
                    url: url_text.clone(),
                    source: err,
                }
            }
        };

        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(map_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url_text.clone(),
            });
        }

        let body = response.text().await.map_err(map_err)?;
        let raw: Value = serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: url_text.clone(),
            source,
        })?;
        let parsed = serde_json::from_value::<T>(raw.clone()).map_err(|source| {
            FetchError::Decode {
                url: url_text.clone(),
                source,
            }
        })?;
        Ok((parsed, raw))
    }
}
