//! Catalog queries for the UI: search, categories, bundles, favorites.
//!
//! Everything here goes through the shared [`CacheManager`]; the UI never
//! talks to a provider directly.

pub mod bundles;
pub mod favorites;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Datelike;
use futures::future::join_all;
use reqwest::Client;

use crate::cache::{CacheManager, PersistentStore, SystemClock, query_key};
use crate::config::Settings;
use crate::error::FetchError;
use crate::fetch::HttpFetcher;
use crate::images::{ImagePreloader, ImageResolver};
use crate::model::{Book, Bundle, BundleWithBooks, Category, SearchPage, discounted_total, sort_by_rating};
use crate::normalize::categories::{DEFAULT_CATEGORY, search_query_for, static_categories};
use crate::normalize::{Normalizer, UNKNOWN_AUTHOR};
use crate::providers::{BookRef, GoogleBooksClient, OpenLibraryClient, RawRecord, google_id, open_library_id};
use crate::random::{RandomSource, SeededRandom};

pub use favorites::{FavoritesStore, MemoryFavoritesStore, PgFavoritesStore};

const USER_AGENT: &str = concat!("digireads-catalog/", env!("CARGO_PKG_VERSION"));
const ALL_CATEGORIES_KEY: &str = "all_categories";
const ALL_BUNDLES_KEY: &str = "all_bundles";
const PREFETCH_LIMIT: u32 = 20;

/// Outcome of one landing-page row. Rows fail independently.
#[derive(Debug)]
pub struct CategorySection {
    pub slug: String,
    pub books: Result<SearchPage>,
}

pub struct Storefront {
    caches: Arc<CacheManager>,
    google: GoogleBooksClient,
    open_library: OpenLibraryClient,
    normalizer: Normalizer,
    preloader: ImagePreloader,
    favorites: Arc<dyn FavoritesStore>,
}

fn book_key(id: &str) -> String {
    format!("book_{id}")
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<FetchError>())
        .any(|fetch| fetch.status() == Some(404))
}

impl Storefront {
    pub fn new(
        caches: Arc<CacheManager>,
        google: GoogleBooksClient,
        open_library: OpenLibraryClient,
        normalizer: Normalizer,
        preloader: ImagePreloader,
        favorites: Arc<dyn FavoritesStore>,
    ) -> Self {
        Self {
            caches,
            google,
            open_library,
            normalizer,
            preloader,
            favorites,
        }
    }

    /// Production wiring: system clock, OS-seeded randomness, one shared
    /// HTTP client for provider calls and image preloads.
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn PersistentStore>,
        favorites: Arc<dyn FavoritesStore>,
    ) -> Result<Self> {
        let clock = Arc::new(SystemClock);
        let caches = Arc::new(CacheManager::new(&settings.cache, store, clock.clone()));
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        let fetcher = HttpFetcher::with_client(client.clone(), caches.clone());

        let google = GoogleBooksClient::with_base_url(
            fetcher.clone(),
            settings.google_api_key.clone(),
            &settings.google_books_base_url,
        )?
        .timeouts(settings.timeouts);
        let open_library = OpenLibraryClient::with_base_url(fetcher, &settings.open_library_base_url)?
            .timeouts(settings.timeouts);

        let rng: Arc<dyn RandomSource> = Arc::new(SeededRandom::from_entropy());
        let images = ImageResolver::from_random(rng.as_ref());
        let normalizer = Normalizer::new(rng, images, clock);
        let preloader = ImagePreloader::new(client, settings.preload_batch);

        Ok(Self::new(caches, google, open_library, normalizer, preloader, favorites))
    }

    pub fn caches(&self) -> &Arc<CacheManager> {
        &self.caches
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Keeps synthesized fields stable: a book seen before is served as it
    /// was first normalized.
    fn remember(&self, book: Book) -> Book {
        let key = book_key(&book.id);
        if let Some(existing) = self.caches.normalized.get_as::<Book>(&key) {
            return existing;
        }
        self.caches
            .normalized
            .set_as(&key, &book, self.caches.normalized.default_ttl());
        book
    }

    fn settle(&self, records: &[RawRecord]) -> Vec<Book> {
        records
            .iter()
            .filter_map(|record| self.normalizer.normalize(record))
            .map(|book| self.remember(book))
            .collect()
    }

    fn preload_covers(&self, books: &[Book]) {
        let urls: Vec<String> = books.iter().map(|b| b.image_url.clone()).collect();
        drop(self.preloader.spawn(urls));
    }

    async fn google_page(&self, query: &str, limit: u32, start_index: u32) -> Result<SearchPage> {
        let response = self.google.search(query, limit, start_index).await?;
        let records: Vec<RawRecord> = response
            .items
            .into_iter()
            .map(RawRecord::GoogleVolume)
            .collect();
        Ok(SearchPage {
            books: self.settle(&records),
            total_items: response.total_items,
        })
    }

    pub async fn search_books(&self, query: &str, limit: u32, start_index: u32) -> Result<SearchPage> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(SearchPage::empty());
        }
        let key = query_key(
            "search_page",
            &[query, &limit.to_string(), &start_index.to_string()],
        );
        if let Some(page) = self.caches.search.get_as::<SearchPage>(&key) {
            return Ok(page);
        }

        let mut page = self.google_page(query, limit, start_index).await?;
        page.books.truncate(limit as usize);
        self.caches
            .search
            .set_as(&key, &page, self.caches.search.default_ttl());
        self.preload_covers(&page.books);
        Ok(page)
    }

    pub async fn search_open_library(&self, query: &str, limit: u32) -> Result<SearchPage> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(SearchPage::empty());
        }
        let docs = self.open_library.search(query, limit).await?;
        let records: Vec<RawRecord> = docs.docs.into_iter().map(RawRecord::OpenLibraryDoc).collect();
        let mut books = self.settle(&records);
        books.truncate(limit as usize);
        self.preload_covers(&books);
        Ok(SearchPage {
            books,
            total_items: docs.num_found,
        })
    }

    /// `Ok(None)` for malformed ids, unknown volumes, and records that turn
    /// out not to be books.
    pub async fn get_book(&self, id: &str) -> Result<Option<Book>> {
        let Some(book_ref) = BookRef::parse(id) else {
            return Ok(None);
        };
        let canonical = match book_ref {
            BookRef::Google(volume_id) => google_id(volume_id),
            BookRef::OpenLibrary(work_id) => open_library_id(work_id),
        };
        let key = book_key(&canonical);
        if let Some(book) = self.caches.normalized.get_persisted_as::<Book>(&key).await {
            return Ok(Some(book));
        }

        let record = match book_ref {
            BookRef::Google(volume_id) => match self.google.get_volume(volume_id).await {
                Ok(volume) => RawRecord::GoogleVolume(volume),
                Err(err) if is_not_found(&err) => return Ok(None),
                Err(err) => return Err(err),
            },
            BookRef::OpenLibrary(work_id) => match self.open_library.get_work_with_author(work_id).await {
                Ok((work, author)) => RawRecord::OpenLibraryWork {
                    id: work_id.to_string(),
                    work,
                    author,
                },
                Err(err) if is_not_found(&err) => return Ok(None),
                Err(err) => return Err(err),
            },
        };

        let Some(book) = self.normalizer.normalize(&record) else {
            return Ok(None);
        };
        self.caches
            .normalized
            .set_persisted_as(&key, &book, self.caches.normalized.default_ttl())
            .await;
        Ok(Some(book))
    }

    /// Search, drop anonymous records, adjust, rank by rating, and cache.
    async fn ranked_listing(
        &self,
        cache_key: &str,
        query: &str,
        limit: u32,
        offset: u32,
        adjust: impl Fn(&mut Book),
    ) -> Result<SearchPage> {
        if let Some(page) = self.caches.books.get_as::<SearchPage>(cache_key) {
            return Ok(page);
        }

        let mut page = self.google_page(query, limit, offset).await?;
        page.books.retain(|book| book.author != UNKNOWN_AUTHOR);
        page.books.iter_mut().for_each(&adjust);
        sort_by_rating(&mut page.books);
        page.books.truncate(limit as usize);

        self.caches
            .books
            .set_as(cache_key, &page, self.caches.books.default_ttl());
        self.preload_covers(&page.books);
        Ok(page)
    }

    pub async fn books_by_category(&self, slug: &str, limit: u32, offset: u32) -> Result<SearchPage> {
        let key = query_key(
            "category_books",
            &[slug, &limit.to_string(), &offset.to_string()],
        );
        let query = search_query_for(slug);
        self.ranked_listing(&key, &query, limit, offset, |book| book.tag_category(slug))
            .await
            .with_context(|| format!("Failed to load books for category {slug}"))
    }

    pub async fn new_releases(&self, limit: u32) -> Result<Vec<Book>> {
        let year = self.normalizer.now().year();
        let query = format!(
            "published:{}-{year} -report -proceedings -bulletin",
            year - 1
        );
        let page = self
            .ranked_listing(&format!("new_releases_{limit}"), &query, limit, 0, |_| {})
            .await
            .context("Failed to load new releases")?;
        Ok(page.books)
    }

    pub async fn featured_books(&self, limit: u32) -> Result<Vec<Book>> {
        let query = "subject:bestseller OR award winner -report -proceedings -bulletin";
        let page = self
            .ranked_listing(&format!("featured_{limit}"), query, limit, 0, |book| {
                book.is_featured = true
            })
            .await
            .context("Failed to load featured books")?;
        Ok(page.books)
    }

    /// Books sharing the first category of `book_id`, excluding it.
    pub async fn recommended_books(&self, book_id: &str, limit: u32) -> Result<Vec<Book>> {
        let Some(book) = self.get_book(book_id).await? else {
            return Ok(Vec::new());
        };
        let slug = book
            .categories
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_CATEGORY);
        let page = self.books_by_category(slug, limit.saturating_add(1), 0).await?;
        Ok(page
            .books
            .into_iter()
            .filter(|candidate| candidate.id != book.id)
            .take(limit as usize)
            .collect())
    }

    /// Loads every category row concurrently; one failing row does not
    /// affect the others.
    pub async fn landing_sections(&self, slugs: &[&str], per_category: u32) -> Vec<CategorySection> {
        let loads = slugs.iter().map(|slug| async move {
            CategorySection {
                slug: slug.to_string(),
                books: self.books_by_category(slug, per_category, 0).await,
            }
        });
        let sections = join_all(loads).await;
        for section in &sections {
            if let Err(err) = &section.books {
                tracing::warn!(slug = %section.slug, error = %err, "landing section failed");
            }
        }
        sections
    }

    pub fn categories(&self) -> Vec<Category> {
        if let Some(cached) = self.caches.categories.get_as::<Vec<Category>>(ALL_CATEGORIES_KEY) {
            return cached;
        }
        let categories = static_categories(self.normalizer.now());
        self.caches.categories.set_as(
            ALL_CATEGORIES_KEY,
            &categories,
            self.caches.categories.default_ttl(),
        );
        categories
    }

    pub fn bundles(&self) -> Vec<Bundle> {
        if let Some(cached) = self.caches.bundles.get_as::<Vec<Bundle>>(ALL_BUNDLES_KEY) {
            return cached;
        }
        let now = self.normalizer.now();
        let bundles: Vec<Bundle> = bundles::BUNDLES.iter().map(|def| def.to_bundle(now)).collect();
        self.caches
            .bundles
            .set_as(ALL_BUNDLES_KEY, &bundles, self.caches.bundles.default_ttl());
        bundles
    }

    /// `Ok(None)` for an unknown bundle id.
    pub async fn bundle_with_books(&self, bundle_id: &str) -> Result<Option<BundleWithBooks>> {
        let Some(definition) = bundles::find(bundle_id) else {
            return Ok(None);
        };
        let key = format!("bundle_{bundle_id}");
        if let Some(cached) = self
            .caches
            .bundles
            .get_persisted_as::<BundleWithBooks>(&key)
            .await
        {
            return Ok(Some(cached));
        }

        let mut page = self
            .google_page(definition.theme_query, definition.book_count, 0)
            .await
            .with_context(|| format!("Failed to load books for bundle {bundle_id}"))?;
        page.books.retain(|book| book.author != UNKNOWN_AUTHOR);
        page.books.truncate(definition.book_count as usize);

        let mut bundle = definition.to_bundle(self.normalizer.now());
        bundle.book_ids = page.books.iter().map(|book| book.id.clone()).collect();
        let original_total: u64 = page.books.iter().map(|book| u64::from(book.price)).sum();
        let discounted = discounted_total(
            page.books.iter().map(|book| book.price),
            definition.discount_percentage,
        );

        let resolved = BundleWithBooks {
            bundle,
            books: page.books,
            original_total,
            discounted_total: discounted,
        };
        self.caches
            .bundles
            .set_persisted_as(&key, &resolved, self.caches.bundles.default_ttl())
            .await;
        Ok(Some(resolved))
    }

    /// Never fails: no user, or a store error, reads as "not a favorite".
    pub async fn is_favorite(&self, book_id: &str, user_id: Option<&str>) -> bool {
        let Some(user_id) = user_id.filter(|u| !u.trim().is_empty()) else {
            return false;
        };
        match self.favorites.contains(user_id, book_id).await {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(book_id, error = %err, "favorite lookup failed");
                false
            }
        }
    }

    /// Flips the favorite flag and returns the new state. Without a user
    /// nothing is stored and the result is `false`.
    pub async fn toggle_favorite(&self, book_id: &str, user_id: Option<&str>) -> Result<bool> {
        let Some(user_id) = user_id.filter(|u| !u.trim().is_empty()) else {
            return Ok(false);
        };
        if self.favorites.contains(user_id, book_id).await? {
            self.favorites.remove(user_id, book_id).await?;
            Ok(false)
        } else {
            self.favorites.insert(user_id, book_id).await?;
            Ok(true)
        }
    }

    /// Favorites resolved to books. Ids that no longer resolve are skipped.
    pub async fn favorite_books(&self, user_id: Option<&str>) -> Result<Vec<Book>> {
        let Some(user_id) = user_id.filter(|u| !u.trim().is_empty()) else {
            return Ok(Vec::new());
        };
        let ids = self.favorites.list(user_id).await?;
        let lookups = join_all(ids.iter().map(|id| self.get_book(id))).await;

        Ok(ids
            .iter()
            .zip(lookups)
            .filter_map(|(id, lookup)| match lookup {
                Ok(book) => book,
                Err(err) => {
                    tracing::warn!(book_id = %id, error = %err, "could not resolve favorite");
                    None
                }
            })
            .collect())
    }

    /// Warms the data every landing page needs.
    pub async fn prefetch_common_data(&self) {
        let categories = self.categories();
        let (featured, releases) = tokio::join!(
            self.featured_books(PREFETCH_LIMIT),
            self.new_releases(PREFETCH_LIMIT)
        );

        match (&featured, &releases) {
            (Ok(featured), Ok(releases)) => tracing::info!(
                categories = categories.len(),
                featured = featured.len(),
                new_releases = releases.len(),
                "prefetched common catalog data"
            ),
            _ => {
                for err in [featured.err(), releases.err()].into_iter().flatten() {
                    tracing::warn!(error = %err, "prefetch step failed");
                }
            }
        }
    }

    pub async fn clear_all_caches(&self) {
        self.caches.clear_all().await;
    }

    /// Drops cached provider payloads and books whose key contains `pattern`.
    pub async fn clear_api_cache(&self, pattern: &str) {
        self.caches.books.clear_matching(pattern).await;
        self.caches.normalized.clear_matching(pattern).await;
        tracing::info!(pattern, "API cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DEFAULT_BOOK_IMAGE;
    use crate::test_support::spawn_server;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::{Json, Router, routing::get};
    use serde_json::{Value, json};
    use crate::config::CacheConfig;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct Hits {
        searches: Arc<AtomicUsize>,
        volumes: Arc<AtomicUsize>,
        params: Arc<Mutex<Vec<HashMap<String, String>>>>,
        ol_params: Arc<Mutex<Vec<HashMap<String, String>>>>,
    }

    impl Hits {
        fn queries(&self) -> Vec<String> {
            self.params
                .lock()
                .unwrap()
                .iter()
                .filter_map(|p| p.get("q").cloned())
                .collect()
        }
    }

    fn achebe_classic(id: &str) -> Value {
        json!({
            "id": id,
            "volumeInfo": {
                "title": "Things Fall Apart",
                "authors": ["Chinua Achebe"],
                "categories": ["Africa"],
                "averageRating": 5.0,
                "ratingsCount": 1000
            }
        })
    }

    fn volume(id: &str, title: &str, author: Option<&str>, rating: Option<f64>, count: Option<u32>) -> Value {
        let mut info = json!({ "title": title });
        if let Some(author) = author {
            info["authors"] = json!([author]);
        }
        if let Some(rating) = rating {
            info["averageRating"] = json!(rating);
        }
        if let Some(count) = count {
            info["ratingsCount"] = json!(count);
        }
        json!({ "id": id, "volumeInfo": info })
    }

    fn priced(mut volume: Value, amount: f64) -> Value {
        volume["saleInfo"] = json!({"retailPrice": {"amount": amount, "currencyCode": "USD"}});
        volume
    }

    async fn search(State(hits): State<Hits>, Query(params): Query<HashMap<String, String>>) -> Response {
        hits.searches.fetch_add(1, Ordering::SeqCst);
        hits.params.lock().unwrap().push(params.clone());
        let q = params.get("q").cloned().unwrap_or_default();
        let items = if q == "achebe" {
            vec![json!({
                "id": "tfa",
                "volumeInfo": {
                    "title": "Things Fall Apart",
                    "authors": ["Chinua Achebe"],
                    "pageCount": 209,
                    "description": "A classic of modern African literature."
                }
            })]
        } else if q.starts_with("subject:fiction africa") {
            vec![
                volume("a3", "Anthills of the Savannah", Some("Chinua Achebe"), Some(3.0), Some(5)),
                achebe_classic("rec"),
                volume("a1", "Arrow of God", Some("Chinua Achebe"), Some(4.8), Some(50)),
                volume("a2", "No Longer at Ease", Some("Chinua Achebe"), Some(4.2), Some(40)),
            ]
        } else if q.starts_with("subject:health") {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        } else if q.starts_with("subject:african literature classics") {
            vec![
                priced(volume("b1", "Arrow of God", Some("Chinua Achebe"), None, None), 10.0),
                priced(volume("b2", "So Long a Letter", Some("Mariama Bâ"), None, None), 12.0),
                priced(volume("b3", "Weep Not, Child", Some("Ngũgĩ wa Thiong'o"), None, None), 8.0),
                priced(volume("b4", "Nervous Conditions", Some("Tsitsi Dangarembga"), None, None), 5.0),
                priced(volume("b5", "The Famished Road", Some("Ben Okri"), None, None), 20.0),
            ]
        } else {
            vec![
                volume("low", "Purple Hibiscus", Some("Chimamanda Ngozi Adichie"), Some(3.5), Some(900)),
                volume("anon", "Folk Tales", None, Some(5.0), Some(1)),
                volume("top", "Half of a Yellow Sun", Some("Chimamanda Ngozi Adichie"), Some(4.5), Some(10)),
                volume("tie", "Americanah", Some("Chimamanda Ngozi Adichie"), Some(4.5), Some(300)),
            ]
        };
        Json(json!({"kind": "books#volumes", "totalItems": items.len(), "items": items})).into_response()
    }

    async fn single_volume(State(hits): State<Hits>, Path(id): Path<String>) -> Response {
        hits.volumes.fetch_add(1, Ordering::SeqCst);
        match id.as_str() {
            "fav1" => Json(volume("fav1", "Arrow of God", Some("Chinua Achebe"), None, None)).into_response(),
            "fav2" => Json(volume("fav2", "Anthills of the Savannah", Some("Chinua Achebe"), None, None))
                .into_response(),
            "rec" => Json(achebe_classic("rec")).into_response(),
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn ol_search(State(hits): State<Hits>, Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        hits.ol_params.lock().unwrap().push(params);
        Json(json!({
            "numFound": 42,
            "docs": [
                {
                    "key": "/works/OL45883W",
                    "title": "Things Fall Apart",
                    "author_name": ["Chinua Achebe"],
                    "first_publish_year": 1958,
                    "cover_i": 123
                },
                {"title": "A record without a key"},
                {"key": "/works/OL2W", "title": "Arrow of God", "author_name": ["Chinua Achebe"]}
            ]
        }))
    }

    async fn ol_work(Path(file): Path<String>) -> Response {
        if file != "OL45883W.json" {
            return StatusCode::NOT_FOUND.into_response();
        }
        Json(json!({
            "key": "/works/OL45883W",
            "title": "Things Fall Apart",
            "description": {"type": "/type/text", "value": "Okonkwo's story."},
            "authors": [{"author": {"key": "/authors/OL1A"}}]
        }))
        .into_response()
    }

    async fn ol_author(Path(file): Path<String>) -> Response {
        if file != "OL1A.json" {
            return StatusCode::NOT_FOUND.into_response();
        }
        Json(json!({
            "name": "Chinua Achebe",
            "bio": {"type": "/type/text", "value": "Nigerian novelist and poet."}
        }))
        .into_response()
    }

    async fn storefront() -> anyhow::Result<(Storefront, Hits, tokio::task::JoinHandle<()>)> {
        storefront_with(CacheConfig::default()).await
    }

    async fn storefront_with(
        config: CacheConfig,
    ) -> anyhow::Result<(Storefront, Hits, tokio::task::JoinHandle<()>)> {
        let hits = Hits::default();
        let app = Router::new()
            .route("/books/v1/volumes", get(search))
            .route("/books/v1/volumes/{id}", get(single_volume))
            .route("/ol/search.json", get(ol_search))
            .route("/ol/works/{file}", get(ol_work))
            .route("/ol/authors/{file}", get(ol_author))
            .with_state(hits.clone());
        let (addr, server) = spawn_server(app).await?;

        let caches = Arc::new(CacheManager::new(
            &config,
            Arc::new(crate::cache::MemoryStore::new()),
            Arc::new(SystemClock),
        ));
        let fetcher = HttpFetcher::new(caches.clone());
        let google = GoogleBooksClient::with_base_url(fetcher.clone(), None, &format!("http://{addr}/books/v1"))?;
        let open_library = OpenLibraryClient::with_base_url(fetcher, &format!("http://{addr}/ol"))?;
        let normalizer = Normalizer::new(
            Arc::new(SeededRandom::from_seed(11)),
            ImageResolver::new(DEFAULT_BOOK_IMAGE, "t"),
            Arc::new(SystemClock),
        );
        let store = Storefront::new(
            caches,
            google,
            open_library,
            normalizer,
            ImagePreloader::new(Client::new(), 5),
            Arc::new(MemoryFavoritesStore::new()),
        );
        Ok((store, hits, server))
    }

    #[tokio::test]
    async fn achebe_search_yields_normalized_book() -> anyhow::Result<()> {
        let (store, _hits, server) = storefront().await?;
        let page = store.search_books("achebe", 10, 0).await?;

        assert_eq!(page.books.len(), 1);
        let book = &page.books[0];
        assert_eq!(book.id, "google:tfa");
        assert_eq!(book.title, "Things Fall Apart");
        assert_eq!(book.author, "Chinua Achebe");
        assert!((30_000..=150_000).contains(&book.price));
        assert!(book.has_category("african-literature"));
        assert!(!book.image_url.is_empty());

        // Details come from the search's normalized copy.
        let details = store.get_book("google:tfa").await?.expect("known book");
        assert_eq!(details.price, book.price);
        assert_eq!(details.format, book.format);

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn category_listing_is_tagged_ranked_truncated_and_cached() -> anyhow::Result<()> {
        let (store, hits, server) = storefront().await?;
        let page = store.books_by_category("fiction", 2, 0).await?;

        let ids: Vec<&str> = page.books.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["google:tie", "google:top"]);
        assert!(page.books.iter().all(|b| b.has_category("fiction")));

        let again = store.books_by_category("fiction", 2, 0).await?;
        assert_eq!(again, page);
        assert_eq!(hits.searches.load(Ordering::SeqCst), 1);

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn bundle_totals_apply_discount() -> anyhow::Result<()> {
        let (store, hits, server) = storefront().await?;
        let resolved = store
            .bundle_with_books("flash-sale-bundle")
            .await?
            .expect("known bundle");

        assert_eq!(resolved.books.len(), 4);
        assert_eq!(resolved.bundle.book_ids.len(), 4);
        assert_eq!(resolved.original_total, 3_500);
        assert_eq!(resolved.discounted_total, 2_100);

        store.bundle_with_books("flash-sale-bundle").await?;
        assert_eq!(hits.searches.load(Ordering::SeqCst), 1);
        assert!(store.bundle_with_books("no-such-bundle").await?.is_none());

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn toggling_twice_restores_state() -> anyhow::Result<()> {
        let (store, _hits, server) = storefront().await?;
        let user = Some("reader-1");

        let before = store.is_favorite("google:fav1", user).await;
        let flipped = store.toggle_favorite("google:fav1", user).await?;
        assert_eq!(flipped, !before);
        assert_eq!(store.is_favorite("google:fav1", user).await, flipped);
        store.toggle_favorite("google:fav1", user).await?;
        assert_eq!(store.is_favorite("google:fav1", user).await, before);

        assert!(!store.toggle_favorite("google:fav1", None).await?);
        assert!(!store.is_favorite("google:fav1", None).await);
        assert!(!store.is_favorite("google:fav1", Some("  ")).await);

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn favorite_books_skip_missing_volumes() -> anyhow::Result<()> {
        let (store, hits, server) = storefront().await?;
        let user = Some("reader-2");
        store.toggle_favorite("google:fav1", user).await?;
        store.toggle_favorite("google:gone", user).await?;
        store.toggle_favorite("google:fav2", user).await?;

        let books = store.favorite_books(user).await?;
        let titles: Vec<&str> = books.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["Anthills of the Savannah", "Arrow of God"]);
        // 404s are terminal only after the retry budget is spent.
        assert_eq!(hits.volumes.load(Ordering::SeqCst), 2 + 3);
        assert!(store.favorite_books(None).await?.is_empty());

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn landing_sections_settle_independently() -> anyhow::Result<()> {
        let (store, _hits, server) = storefront().await?;
        let sections = store.landing_sections(&["fiction", "health"], 3).await;

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].slug, "fiction");
        assert_eq!(sections[0].books.as_ref().map(|p| p.books.len()).ok(), Some(3));
        assert_eq!(sections[1].slug, "health");
        assert!(sections[1].books.is_err());

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn static_lists_and_cache_administration() -> anyhow::Result<()> {
        let (store, hits, server) = storefront().await?;
        assert_eq!(store.categories().len(), 8);
        assert_eq!(store.bundles().len(), 3);
        assert!(store.get_book("").await?.is_none());

        store.search_books("achebe", 5, 0).await?;
        assert!(store.get_book("google:tfa").await?.is_some());
        store.clear_all_caches().await;

        // Nothing cached: the search goes back to the provider.
        store.search_books("achebe", 5, 0).await?;
        assert_eq!(hits.searches.load(Ordering::SeqCst), 2);

        store.clear_api_cache("book_google:tfa").await;
        assert!(store.caches().normalized.get("book_google:tfa").is_none());

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn open_library_search_maps_docs_and_total() -> anyhow::Result<()> {
        let (store, hits, server) = storefront().await?;
        let page = store.search_open_library("achebe", 5).await?;

        let ids: Vec<&str> = page.books.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["openlibrary:OL45883W", "openlibrary:OL2W"]);
        assert_eq!(page.total_items, 42);
        assert_eq!(page.books[0].author, "Chinua Achebe");

        let truncated = store.search_open_library("achebe", 1).await?;
        assert_eq!(truncated.books.len(), 1);

        let seen = hits.ol_params.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].get("q").map(String::as_str), Some("achebe"));
        assert_eq!(seen[0].get("limit").map(String::as_str), Some("5"));
        assert_eq!(seen[1].get("limit").map(String::as_str), Some("1"));
        assert!(store.search_open_library("   ", 5).await?.books.is_empty());

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn open_library_work_includes_author_bio() -> anyhow::Result<()> {
        let (store, _hits, server) = storefront().await?;
        let book = store
            .get_book("openlibrary:OL45883W")
            .await?
            .expect("known work");

        assert_eq!(book.id, "openlibrary:OL45883W");
        assert_eq!(book.title, "Things Fall Apart");
        assert_eq!(book.author, "Chinua Achebe");
        assert!(book.description.starts_with("Okonkwo's story."));
        assert!(
            book.description
                .ends_with("\n\nAbout the author: Nigerian novelist and poet.")
        );

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn recommendations_exclude_the_book_itself() -> anyhow::Result<()> {
        let (store, hits, server) = storefront().await?;
        let source = store.get_book("google:rec").await?.expect("known book");
        assert_eq!(source.categories.first().map(String::as_str), Some("african-literature"));

        let recommended = store.recommended_books("google:rec", 2).await?;
        let ids: Vec<&str> = recommended.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["google:a1", "google:a2"]);

        let params = hits.params.lock().unwrap().clone();
        assert_eq!(params.len(), 1);
        assert!(params[0]["q"].starts_with("subject:fiction africa"));
        // One extra result is requested so the excluded book leaves `limit`.
        assert_eq!(params[0].get("maxResults").map(String::as_str), Some("6"));

        let everything = store.recommended_books("google:rec", u32::MAX).await?;
        assert_eq!(everything.len(), 3);
        assert!(everything.iter().all(|b| b.id != "google:rec"));

        assert!(store.recommended_books("google:missing", 2).await?.is_empty());

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn featured_books_are_all_flagged() -> anyhow::Result<()> {
        let (store, hits, server) = storefront().await?;
        let featured = store.featured_books(10).await?;

        let ids: Vec<&str> = featured.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["google:tie", "google:top", "google:low"]);
        assert!(featured.iter().all(|b| b.is_featured));
        assert!(hits.queries()[0].starts_with("subject:bestseller"));

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn new_releases_query_covers_last_two_years() -> anyhow::Result<()> {
        let (store, hits, server) = storefront().await?;
        let year = store.normalizer().now().year();
        let releases = store.new_releases(2).await?;

        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].id, "google:tie");
        assert_eq!(
            hits.queries(),
            vec![format!("published:{}-{year} -report -proceedings -bulletin", year - 1)]
        );

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn prefetch_warms_categories_featured_and_releases() -> anyhow::Result<()> {
        let (store, hits, server) = storefront().await?;
        store.prefetch_common_data().await;

        assert_eq!(hits.searches.load(Ordering::SeqCst), 2);
        assert!(store.caches().categories.get(ALL_CATEGORIES_KEY).is_some());

        // Both listings are now served from cache.
        store.featured_books(PREFETCH_LIMIT).await?;
        store.new_releases(PREFETCH_LIMIT).await?;
        assert_eq!(hits.searches.load(Ordering::SeqCst), 2);

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn remembered_books_do_not_evict_listings() -> anyhow::Result<()> {
        let mut config = CacheConfig::default();
        config.books.max_items = 3;
        let (store, hits, server) = storefront_with(config).await?;

        // Raw payload plus listing: two entries in the books tier.
        store.books_by_category("fiction", 3, 0).await?;
        // One more raw payload; its normalized book lives elsewhere.
        store.search_books("achebe", 5, 0).await?;
        assert!(store.caches().normalized.get("book_google:tfa").is_some());

        store.books_by_category("fiction", 3, 0).await?;
        assert_eq!(hits.searches.load(Ordering::SeqCst), 2);
        assert_eq!(store.caches().books.memory().len(), 3);

        server.abort();
        Ok(())
    }
}
