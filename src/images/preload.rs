use std::time::Duration;

use futures::future::join_all;
use moka::future::Cache;
use reqwest::Client;
use tokio::task::JoinHandle;

use super::ImageResolver;

pub const MIN_BATCH: usize = 5;
pub const MAX_BATCH: usize = 8;
const PER_IMAGE_TIMEOUT: Duration = Duration::from_secs(3);
const STAGGER: Duration = Duration::from_millis(100);
const WARM_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadReport {
    pub attempted: usize,
    pub warmed: usize,
    pub failed: usize,
}

/// Warms cover images in the background so the first render finds them
/// cached. Failures are logged and dropped.
#[derive(Clone)]
pub struct ImagePreloader {
    client: Client,
    warm: Cache<String, ()>,
    batch: usize,
    per_image_timeout: Duration,
    stagger: Duration,
}

impl ImagePreloader {
    pub fn new(client: Client, batch: usize) -> Self {
        Self {
            client,
            warm: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(WARM_TTL)
                .build(),
            batch: batch.clamp(MIN_BATCH, MAX_BATCH),
            per_image_timeout: PER_IMAGE_TIMEOUT,
            stagger: STAGGER,
        }
    }

    pub fn with_timing(mut self, per_image_timeout: Duration, stagger: Duration) -> Self {
        self.per_image_timeout = per_image_timeout;
        self.stagger = stagger;
        self
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn is_warm(&self, url: &str) -> bool {
        self.warm.contains_key(url)
    }

    /// Preloads the first batch of remote, not-yet-warm URLs. Each request is
    /// delayed by its position times the stagger and bounded by its own timeout.
    pub async fn preload(&self, urls: &[String]) -> PreloadReport {
        let batch: Vec<&String> = urls
            .iter()
            .filter(|url| !ImageResolver::is_local(url) && !self.is_warm(url))
            .take(self.batch)
            .collect();

        let outcomes = join_all(batch.iter().enumerate().map(|(index, url)| async move {
            tokio::time::sleep(self.stagger * index as u32).await;
            self.fetch_one(url).await
        }))
        .await;

        let warmed = outcomes.iter().filter(|ok| **ok).count();
        let report = PreloadReport {
            attempted: outcomes.len(),
            warmed,
            failed: outcomes.len() - warmed,
        };
        if report.attempted > 0 {
            tracing::debug!(
                attempted = report.attempted,
                warmed = report.warmed,
                failed = report.failed,
                "image preload batch finished"
            );
        }
        report
    }

    /// Fire-and-forget variant of [`preload`](Self::preload).
    pub fn spawn(&self, urls: Vec<String>) -> JoinHandle<PreloadReport> {
        let preloader = self.clone();
        tokio::spawn(async move { preloader.preload(&urls).await })
    }

    async fn fetch_one(&self, url: &str) -> bool {
        let request = self.client.get(url).timeout(self.per_image_timeout).send();
        match request.await {
            Ok(response) if response.status().is_success() => {
                self.warm.insert(url.to_string(), ()).await;
                true
            }
            Ok(response) => {
                tracing::debug!(url, status = %response.status(), "image preload rejected");
                false
            }
            Err(err) => {
                tracing::debug!(url, error = %err, "image preload failed");
                false
            }
        }
    }
}
