use anyhow::{Context, Result, anyhow};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::cache::query_key;
use crate::config::{OPEN_LIBRARY_API_BASE, Timeouts};
use crate::fetch::{HttpFetcher, RetryPolicy};

pub const COVERS_BASE: &str = "https://covers.openlibrary.org/b/id";

#[derive(Clone)]
pub struct OpenLibraryClient {
    fetcher: HttpFetcher,
    base_url: Url,
    timeouts: Timeouts,
}

impl OpenLibraryClient {
    pub fn new(fetcher: HttpFetcher) -> Self {
        let base_url =
            Url::parse(OPEN_LIBRARY_API_BASE).expect("OPEN_LIBRARY_API_BASE should be a valid URL");
        Self {
            fetcher,
            base_url,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_base_url(fetcher: HttpFetcher, base_url: &str) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("invalid OpenLibrary base URL {base_url}"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            fetcher,
            base_url,
            timeouts: Timeouts::default(),
        })
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    fn resource_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| anyhow!("Cannot be base for path segments"))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    pub async fn search(&self, query: &str, limit: u32) -> Result<SearchDocs> {
        let mut url = self.resource_url(&["search.json"])?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("limit", &limit.to_string());

        let cache_key = query_key("ol_search", &[query, &limit.to_string()]);
        let ttl = self.fetcher.caches().search.default_ttl();
        let policy = RetryPolicy::with_timeout(self.timeouts.open_library);

        self.fetcher
            .fetch_with_cache::<SearchDocs>(&url, &cache_key, ttl, &policy)
            .await
            .with_context(|| format!("OpenLibrary search failed for query {query:?}"))
    }

    /// `work_id` is the bare id, e.g. `OL45883W`.
    pub async fn get_work(&self, work_id: &str) -> Result<Work> {
        let url = self.resource_url(&["works", &format!("{work_id}.json")])?;
        let ttl = self.fetcher.caches().books.default_ttl();
        let policy = RetryPolicy::with_timeout(self.timeouts.open_library);

        self.fetcher
            .fetch_with_cache::<Work>(&url, &format!("ol_work_{work_id}"), ttl, &policy)
            .await
            .with_context(|| format!("OpenLibrary work fetch failed for {work_id}"))
    }

    /// `author_key` as it appears on a work, e.g. `/authors/OL34184A`.
    pub async fn get_author(&self, author_key: &str) -> Result<Author> {
        let id = author_key.rsplit('/').next().unwrap_or(author_key);
        let url = self.resource_url(&["authors", &format!("{id}.json")])?;
        let ttl = self.fetcher.caches().books.default_ttl();
        let policy = RetryPolicy::with_timeout(self.timeouts.author);

        self.fetcher
            .fetch_with_cache::<Author>(&url, &format!("ol_author_{id}"), ttl, &policy)
            .await
            .with_context(|| format!("OpenLibrary author fetch failed for {author_key}"))
    }

    /// Work plus its first author. The author lookup is best effort.
    pub async fn get_work_with_author(&self, work_id: &str) -> Result<(Work, Option<Author>)> {
        let work = self.get_work(work_id).await?;
        let author = match work.first_author_key() {
            Some(key) => match self.get_author(key).await {
                Ok(author) => Some(author),
                Err(err) => {
                    tracing::warn!(work_id, error = %err, "author lookup failed; continuing without bio");
                    None
                }
            },
            None => None,
        };
        Ok((work, author))
    }
}

/// OpenLibrary text fields come either as a bare string or `{type, value}`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum TextValue {
    Plain(String),
    Typed { value: String },
}

impl TextValue {
    pub fn as_str(&self) -> &str {
        match self {
            TextValue::Plain(text) => text,
            TextValue::Typed { value } => value,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SearchDocs {
    #[serde(default, deserialize_with = "super::lenient_list")]
    pub docs: Vec<SearchDoc>,
    #[serde(default, rename = "numFound")]
    pub num_found: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SearchDoc {
    pub key: String,
    #[serde(default)]
    pub title: String,
    pub author_name: Option<Vec<String>>,
    pub cover_i: Option<i64>,
    pub first_publish_year: Option<i32>,
    pub publisher: Option<Vec<String>>,
    pub subject: Option<Vec<String>>,
    pub number_of_pages_median: Option<u32>,
    pub ratings_average: Option<f64>,
    pub ratings_count: Option<u32>,
}

impl SearchDoc {
    pub fn work_id(&self) -> &str {
        self.key.trim_start_matches("/works/")
    }

    pub fn first_author(&self) -> Option<&str> {
        first_non_empty(self.author_name.as_deref())
    }

    pub fn first_publisher(&self) -> Option<&str> {
        first_non_empty(self.publisher.as_deref())
    }

    pub fn subjects(&self) -> &[String] {
        self.subject.as_deref().unwrap_or_default()
    }

    pub fn cover_url(&self) -> Option<String> {
        self.cover_i.filter(|id| *id > 0).map(cover_url)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Work {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub title: String,
    pub description: Option<TextValue>,
    pub covers: Option<Vec<i64>>,
    pub subjects: Option<Vec<String>>,
    pub authors: Option<Vec<WorkAuthor>>,
}

impl Work {
    pub fn first_author_key(&self) -> Option<&str> {
        self.authors
            .as_ref()?
            .iter()
            .find_map(|a| a.author.as_ref().map(|r| r.key.as_str()))
    }

    pub fn subjects(&self) -> &[String] {
        self.subjects.as_deref().unwrap_or_default()
    }

    pub fn cover_url(&self) -> Option<String> {
        self.covers
            .as_ref()?
            .iter()
            .copied()
            .find(|id| *id > 0)
            .map(cover_url)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct WorkAuthor {
    pub author: Option<KeyRef>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct KeyRef {
    pub key: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Author {
    pub name: Option<String>,
    pub bio: Option<TextValue>,
}

fn cover_url(id: i64) -> String {
    format!("{COVERS_BASE}/{id}-L.jpg")
}

fn first_non_empty(values: Option<&[String]>) -> Option<&str> {
    values?
        .iter()
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}
