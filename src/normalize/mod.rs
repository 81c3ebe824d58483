//! Provider records to canonical [`Book`]s.

pub mod categories;
pub mod pricing;
pub mod text;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cache::Clock;
use crate::images::ImageResolver;
use crate::model::Book;
use crate::providers::google_books::Volume;
use crate::providers::open_library::{Author, SearchDoc, Work};
use crate::providers::{RawRecord, google_id, open_library_id};
use crate::random::RandomSource;

use categories::{POETRY, infer_categories};
use pricing::PriceInputs;

pub const UNKNOWN_AUTHOR: &str = "Unknown Author";
pub const NO_DESCRIPTION: &str = "No description available.";

/// Fields shared by every provider once their own quirks are resolved.
struct Draft<'a> {
    id: String,
    title: &'a str,
    author: String,
    description: String,
    tags: &'a [String],
    page_count: Option<u32>,
    sale_price: Option<u32>,
    image_url: Option<&'a str>,
    ratings: Option<f64>,
    ratings_count: Option<u32>,
}

#[derive(Clone)]
pub struct Normalizer {
    rng: Arc<dyn RandomSource>,
    images: ImageResolver,
    clock: Arc<dyn Clock>,
}

impl Normalizer {
    pub fn new(rng: Arc<dyn RandomSource>, images: ImageResolver, clock: Arc<dyn Clock>) -> Self {
        Self { rng, images, clock }
    }

    pub fn images(&self) -> &ImageResolver {
        &self.images
    }

    /// `None` for records that are not sellable books.
    pub fn normalize(&self, record: &RawRecord) -> Option<Book> {
        match record {
            RawRecord::GoogleVolume(volume) => self.from_google(volume),
            RawRecord::OpenLibraryDoc(doc) => self.from_search_doc(doc),
            RawRecord::OpenLibraryWork { id, work, author } => {
                self.from_work(id, work, author.as_ref())
            }
        }
    }

    pub fn normalize_all<'r>(&self, records: impl IntoIterator<Item = &'r RawRecord>) -> Vec<Book> {
        records
            .into_iter()
            .filter_map(|record| self.normalize(record))
            .collect()
    }

    fn from_google(&self, volume: &Volume) -> Option<Book> {
        let title = volume.title();
        if text::is_non_book(title, volume.has_author(), volume.has_publisher()) {
            tracing::debug!(id = %volume.id, title, "skipping non-book volume");
            return None;
        }
        let info = &volume.volume_info;

        let description = info
            .description
            .as_deref()
            .map(text::clean_description)
            .filter(|d| !d.is_empty())
            .or_else(|| {
                info.subtitle
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                format!(
                    "Published by {} in {}.",
                    info.publisher.as_deref().unwrap_or("Unknown"),
                    volume.published_year().unwrap_or("an unknown year"),
                )
            });

        Some(self.finish(Draft {
            id: google_id(&volume.id),
            title,
            author: volume
                .authors_display()
                .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            description,
            tags: volume.categories(),
            page_count: info.page_count,
            sale_price: volume.sale_price_minor(),
            image_url: volume.best_image_url(),
            ratings: info.average_rating,
            ratings_count: info.ratings_count,
        }))
    }

    fn from_search_doc(&self, doc: &SearchDoc) -> Option<Book> {
        let title = doc.title.trim();
        if text::is_non_book(title, doc.first_author().is_some(), doc.first_publisher().is_some()) {
            tracing::debug!(key = %doc.key, title, "skipping non-book search document");
            return None;
        }
        let cover = doc.cover_url();
        let description = format!(
            "Published {} by {}.",
            doc.first_publish_year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "in an unknown year".to_string()),
            doc.first_publisher().unwrap_or("an unknown publisher"),
        );

        Some(self.finish(Draft {
            id: open_library_id(doc.work_id()),
            title,
            author: doc
                .first_author()
                .unwrap_or(UNKNOWN_AUTHOR)
                .to_string(),
            description,
            tags: doc.subjects(),
            page_count: doc.number_of_pages_median,
            sale_price: None,
            image_url: cover.as_deref(),
            ratings: doc.ratings_average,
            ratings_count: doc.ratings_count,
        }))
    }

    fn from_work(&self, id: &str, work: &Work, author: Option<&Author>) -> Option<Book> {
        let title = work.title.trim();
        let author_name = author
            .and_then(|a| a.name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty());
        let has_author = author_name.is_some() || work.first_author_key().is_some();
        if text::is_non_book(title, has_author, false) {
            tracing::debug!(id, title, "skipping non-book work");
            return None;
        }

        let description = work
            .description
            .as_ref()
            .map(|d| text::clean_description(d.as_str()))
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| NO_DESCRIPTION.to_string());
        let bio = author.and_then(|a| a.bio.as_ref()).map(|b| b.as_str());
        let cover = work.cover_url();

        Some(self.finish(Draft {
            id: open_library_id(id),
            title,
            author: author_name.unwrap_or(UNKNOWN_AUTHOR).to_string(),
            description: text::with_author_bio(description, bio),
            tags: work.subjects(),
            page_count: None,
            sale_price: None,
            image_url: cover.as_deref(),
            ratings: None,
            ratings_count: None,
        }))
    }

    fn finish(&self, draft: Draft<'_>) -> Book {
        let categories = infer_categories(draft.tags, draft.title, &draft.description);
        let is_poetry = categories.iter().any(|c| c == POETRY);
        let rng = self.rng.as_ref();

        let price = pricing::price(
            PriceInputs {
                title: draft.title,
                is_poetry,
                page_count: draft.page_count,
                sale_price: draft.sale_price,
            },
            rng,
        );
        let format = pricing::format(is_poetry, rng);
        let is_featured = pricing::featured(rng);
        let now = self.now();

        Book {
            id: draft.id,
            title: draft.title.to_string(),
            author: draft.author,
            price,
            description: draft.description,
            image_url: self.images.optimize(draft.image_url),
            format,
            categories,
            is_featured,
            ratings: draft.ratings,
            ratings_count: draft.ratings_count,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.clock.now_ms()).unwrap_or_else(Utc::now)
    }
}
