//! Catalog caching and normalization for the DigiReads storefront.
//!
//! Provider records from Google Books and OpenLibrary pass through a two-tier
//! cache and a normalizer into one canonical [`model::Book`] shape. The
//! [`storefront::Storefront`] façade is the only entry point the UI needs.

pub mod cache;
pub mod cache_warmer;
pub mod config;
pub mod error;
pub mod fetch;
pub mod images;
pub mod model;
pub mod normalize;
pub mod providers;
pub mod random;
pub mod storefront;

#[cfg(test)]
mod test_support;

pub use config::Settings;
pub use model::{Book, BookFormat, Bundle, BundleWithBooks, Category, SearchPage};
pub use storefront::Storefront;
