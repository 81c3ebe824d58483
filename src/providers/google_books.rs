use anyhow::{Context, Result, anyhow};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::cache::query_key;
use crate::config::{GOOGLE_BOOKS_API_BASE, Timeouts};
use crate::fetch::{HttpFetcher, RetryPolicy};

/// Google caps `maxResults` at 40.
pub const MAX_RESULTS_CAP: u32 = 40;

#[derive(Clone)]
pub struct GoogleBooksClient {
    fetcher: HttpFetcher,
    api_key: Option<String>,
    base_url: Url,
    timeouts: Timeouts,
}

impl GoogleBooksClient {
    pub fn new(fetcher: HttpFetcher, api_key: Option<String>) -> Self {
        let base_url = Self::normalize_base_url(
            Url::parse(GOOGLE_BOOKS_API_BASE).expect("GOOGLE_BOOKS_API_BASE should be a valid URL"),
        );
        Self {
            fetcher,
            api_key,
            base_url,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_base_url(fetcher: HttpFetcher, api_key: Option<String>, base_url: &str) -> Result<Self> {
        let base_url = Self::normalize_base_url(
            Url::parse(base_url).with_context(|| format!("invalid Google Books base URL {base_url}"))?,
        );
        Ok(Self {
            fetcher,
            api_key,
            base_url,
            timeouts: Timeouts::default(),
        })
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    fn normalize_base_url(mut base_url: Url) -> Url {
        if !base_url.path().ends_with('/') {
            let mut path = base_url.path().to_owned();
            path.push('/');
            base_url.set_path(&path);
        }
        base_url
    }

    /// Full-text volume search. Asks for twice `limit` (capped at 40) so that
    /// filtering out non-books still leaves enough results.
    pub async fn search(&self, query: &str, limit: u32, start_index: u32) -> Result<SearchResponse> {
        let max_results = (limit.saturating_mul(2)).clamp(1, MAX_RESULTS_CAP);

        let mut url = self.base_url.join("volumes")?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("q", query);
            qp.append_pair("maxResults", &max_results.to_string());
            qp.append_pair("startIndex", &start_index.to_string());
            qp.append_pair("printType", "books");
            qp.append_pair("projection", "full");
            if let Some(key) = &self.api_key {
                qp.append_pair("key", key);
            }
        }

        let cache_key = query_key(
            "gb_search",
            &[query, &limit.to_string(), &start_index.to_string()],
        );
        let ttl = self.fetcher.caches().search.default_ttl();
        let policy = RetryPolicy::with_timeout(self.timeouts.search);

        self.fetcher
            .fetch_with_cache::<SearchResponse>(&url, &cache_key, ttl, &policy)
            .await
            .with_context(|| format!("Google Books search failed for query {query:?}"))
    }

    /// Fetch a specific volume by its Google Books volume ID.
    pub async fn get_volume(&self, volume_id: &str) -> Result<Volume> {
        let mut url = self.base_url.join("volumes")?;
        {
            // push the id as a path segment to ensure correct encoding
            url.path_segments_mut()
                .map_err(|_| anyhow!("Cannot be base for path segments"))?
                .push(volume_id);
            if let Some(key) = &self.api_key {
                url.query_pairs_mut().append_pair("key", key);
            }
        }

        let cache_key = format!("gb_book_{volume_id}");
        let ttl = self.fetcher.caches().books.default_ttl();
        let policy = RetryPolicy::with_timeout(self.timeouts.details);

        self.fetcher
            .fetch_with_cache::<Volume>(&url, &cache_key, ttl, &policy)
            .await
            .with_context(|| format!("Google Books volume fetch failed for ID {volume_id}"))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SearchResponse {
    #[serde(default, deserialize_with = "super::lenient_list")]
    pub items: Vec<Volume>,
    #[serde(default, rename = "totalItems")]
    pub total_items: u64,
    #[serde(default)]
    pub kind: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Volume {
    pub id: String,
    #[serde(rename = "volumeInfo")]
    pub volume_info: VolumeInfo,
    #[serde(default, rename = "saleInfo")]
    pub sale_info: Option<SaleInfo>,
}

impl Volume {
    pub fn title(&self) -> &str {
        self.volume_info.title.trim()
    }

    pub fn authors_display(&self) -> Option<String> {
        self.volume_info
            .authors
            .as_ref()
            .map(|v| v.join(", "))
            .filter(|s| !s.trim().is_empty())
    }

    pub fn has_author(&self) -> bool {
        self.volume_info
            .authors
            .as_ref()
            .is_some_and(|authors| authors.iter().any(|a| !a.trim().is_empty()))
    }

    pub fn has_publisher(&self) -> bool {
        self.volume_info
            .publisher
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
    }

    /// Prefers the larger renditions; the small thumbnail is a last resort.
    pub fn best_image_url(&self) -> Option<&str> {
        let links = self.volume_info.image_links.as_ref()?;
        links
            .extra_large
            .as_deref()
            .or(links.large.as_deref())
            .or(links.medium.as_deref())
            .or(links.small.as_deref())
            .or(links.thumbnail.as_deref())
            .or(links.small_thumbnail.as_deref())
            .filter(|url| !url.trim().is_empty())
    }

    pub fn categories(&self) -> &[String] {
        self.volume_info.categories.as_deref().unwrap_or_default()
    }

    /// Real price in minor units, retail before list.
    pub fn sale_price_minor(&self) -> Option<u32> {
        let sale = self.sale_info.as_ref()?;
        let price = sale.retail_price.as_ref().or(sale.list_price.as_ref())?;
        (price.amount.is_finite() && price.amount >= 0.0).then(|| (price.amount * 100.0).round() as u32)
    }

    pub fn published_year(&self) -> Option<&str> {
        self.volume_info
            .published_date
            .as_deref()
            .and_then(|date| date.get(..4))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct VolumeInfo {
    #[serde(default)]
    pub title: String,
    pub subtitle: Option<String>,
    pub authors: Option<Vec<String>>,
    pub publisher: Option<String>,
    #[serde(rename = "publishedDate")]
    pub published_date: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "pageCount")]
    pub page_count: Option<u32>,
    pub categories: Option<Vec<String>>,
    #[serde(rename = "averageRating")]
    pub average_rating: Option<f64>,
    #[serde(rename = "ratingsCount")]
    pub ratings_count: Option<u32>,
    #[serde(rename = "imageLinks")]
    pub image_links: Option<ImageLinks>,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ImageLinks {
    #[serde(rename = "smallThumbnail")]
    pub small_thumbnail: Option<String>,
    pub thumbnail: Option<String>,
    pub small: Option<String>,
    pub medium: Option<String>,
    pub large: Option<String>,
    #[serde(rename = "extraLarge")]
    pub extra_large: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SaleInfo {
    #[serde(rename = "listPrice")]
    pub list_price: Option<Price>,
    #[serde(rename = "retailPrice")]
    pub retail_price: Option<Price>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Price {
    pub amount: f64,
    #[serde(rename = "currencyCode")]
    pub currency_code: String,
}
