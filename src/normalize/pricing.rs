//! Synthetic storefront metadata for records whose provider has no price,
//! format or featured signal. All amounts are minor currency units.

use crate::model::BookFormat;
use crate::random::RandomSource;

pub const PAGE_BASE: u32 = 50_000;
pub const PER_PAGE: u32 = 1_000;
pub const PAGE_BAND: (u32, u32) = (30_000, 150_000);
pub const POETRY_BAND: (u32, u32) = (30_000, 50_000);
/// Half-open: upper bound excluded.
pub const FALLBACK_BAND: (u32, u32) = (70_000, 120_000);

const EBOOK_BIAS_THRESHOLD: f64 = 0.7;
const FEATURED_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, Default)]
pub struct PriceInputs<'a> {
    pub title: &'a str,
    pub is_poetry: bool,
    pub page_count: Option<u32>,
    pub sale_price: Option<u32>,
}

/// Poetry titles naming a single poem, or short poetry titles, are free.
pub fn is_single_poem(title: &str, is_poetry: bool) -> bool {
    if !is_poetry {
        return false;
    }
    let lowered = title.to_lowercase();
    (lowered.contains("poem") && !lowered.contains("poems"))
        || (lowered.contains("poetry") && title.chars().count() < 30)
}

pub fn price_from_pages(pages: u32) -> u32 {
    pages
        .saturating_mul(PER_PAGE)
        .saturating_add(PAGE_BASE)
        .clamp(PAGE_BAND.0, PAGE_BAND.1)
}

pub fn price(inputs: PriceInputs<'_>, rng: &dyn RandomSource) -> u32 {
    if is_single_poem(inputs.title, inputs.is_poetry) {
        return 0;
    }
    if let Some(real) = inputs.sale_price {
        return real;
    }
    if inputs.is_poetry {
        return rng.below(POETRY_BAND.0, POETRY_BAND.1 + 1);
    }
    match inputs.page_count.filter(|pages| *pages > 0) {
        Some(pages) => price_from_pages(pages),
        None => rng.below(FALLBACK_BAND.0, FALLBACK_BAND.1),
    }
}

pub fn format(is_poetry: bool, rng: &dyn RandomSource) -> BookFormat {
    if is_poetry && rng.unit() > EBOOK_BIAS_THRESHOLD {
        return BookFormat::Ebook;
    }
    BookFormat::ALL[rng.index(BookFormat::ALL.len())]
}

pub fn featured(rng: &dyn RandomSource) -> bool {
    rng.unit() > FEATURED_THRESHOLD
}
