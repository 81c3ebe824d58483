use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local placeholder served when no provider image can be used.
pub const DEFAULT_BOOK_IMAGE: &str = "/assets/digireads-placeholder.jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Ebook,
    Hardcover,
    Both,
}

impl BookFormat {
    pub const ALL: [BookFormat; 3] = [BookFormat::Ebook, BookFormat::Hardcover, BookFormat::Both];

    pub fn label(self) -> &'static str {
        match self {
            BookFormat::Ebook => "E-book",
            BookFormat::Hardcover => "Print",
            BookFormat::Both => "E-book & Print",
        }
    }
}

/// Canonical, provider-agnostic book record.
///
/// `price` is in minor currency units (cents). `image_url` is never empty and
/// `categories` always holds at least one slug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub price: u32,
    pub description: String,
    pub image_url: String,
    pub format: BookFormat,
    pub categories: Vec<String>,
    pub is_featured: bool,
    pub ratings: Option<f64>,
    pub ratings_count: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn has_category(&self, slug: &str) -> bool {
        self.categories.iter().any(|c| c.eq_ignore_ascii_case(slug))
    }

    /// Adds `slug` unless already present.
    pub fn tag_category(&mut self, slug: &str) {
        if !self.has_category(slug) {
            self.categories.push(slug.to_string());
        }
    }

    pub fn rating_or_zero(&self) -> f64 {
        self.ratings.unwrap_or(0.0)
    }

    pub fn ratings_count_or_zero(&self) -> u32 {
        self.ratings_count.unwrap_or(0)
    }
}

/// Orders books by rating, then by rating count, both descending.
pub fn sort_by_rating(books: &mut [Book]) {
    books.sort_by(|a, b| {
        b.rating_or_zero()
            .total_cmp(&a.rating_or_zero())
            .then_with(|| b.ratings_count_or_zero().cmp(&a.ratings_count_or_zero()))
    });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: String,
    pub name: String,
    pub description: String,
    pub discount_percentage: u8,
    pub image_url: String,
    pub is_active: bool,
    /// Filled in once the bundle's theme query has been resolved.
    #[serde(default)]
    pub book_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleWithBooks {
    pub bundle: Bundle,
    pub books: Vec<Book>,
    pub original_total: u64,
    pub discounted_total: u64,
}

/// One page of search results plus the provider's total hit count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub books: Vec<Book>,
    pub total_items: u64,
}

impl SearchPage {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// `round(sum × (1 − discount/100))`
pub fn discounted_total(prices: impl IntoIterator<Item = u32>, discount_percentage: u8) -> u64 {
    let sum: u64 = prices.into_iter().map(u64::from).sum();
    let factor = 1.0 - f64::from(discount_percentage.min(100)) / 100.0;
    (sum as f64 * factor).round() as u64
}
