//! Cover image URL handling: provider-specific optimization, the retry
//! ladder's URL mutations, a fixed pool of fallback images, and background
//! preloading.

pub mod loader;
pub mod preload;

use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::model::DEFAULT_BOOK_IMAGE;
use crate::random::RandomSource;

pub use loader::{ImageEvent, ImageLoader, ImageState};
pub use preload::{ImagePreloader, PreloadReport};

/// Generic covers used once every variant of a provider URL has failed.
pub const FALLBACK_POOL: [&str; 5] = [
    "https://images.unsplash.com/photo-1544947950-fa07a98d237f?w=400&q=80",
    "https://images.unsplash.com/photo-1512820790803-83ca734da794?w=400&q=80",
    "https://images.unsplash.com/photo-1543002588-bfa74002ed7e?w=400&q=80",
    "https://images.unsplash.com/photo-1589829085413-56de8ae18c73?w=400&q=80",
    "https://images.unsplash.com/photo-1495446815901-a7297e633e8d?w=400&q=80",
];

const CACHE_BUST_PARAM: &str = "cb";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Host {
    GoogleBooks,
    OpenLibraryCovers,
    Other,
}

fn classify(url: &Url) -> Host {
    let host = url.host_str().unwrap_or_default();
    if host.starts_with("books.google.")
        || host.ends_with("googleusercontent.com")
        || host.ends_with("googleapis.com")
    {
        Host::GoogleBooks
    } else if host == "covers.openlibrary.org" {
        Host::OpenLibraryCovers
    } else {
        Host::Other
    }
}

/// Turns provider image URLs into the URLs we actually render.
#[derive(Debug, Clone)]
pub struct ImageResolver {
    placeholder: String,
    cache_bust: String,
}

impl ImageResolver {
    pub fn new(placeholder: impl Into<String>, cache_bust: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            cache_bust: cache_bust.into(),
        }
    }

    /// Resolver with a fresh cache-busting token drawn from `rng`.
    pub fn from_random(rng: &dyn RandomSource) -> Self {
        let token = format!("{:06x}", rng.below(0, 0x0100_0000));
        Self::new(DEFAULT_BOOK_IMAGE, token)
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn is_local(url: &str) -> bool {
        url.starts_with('/')
    }

    /// Forces HTTPS, strips Google's curl decoration and cropping zoom,
    /// upsizes OpenLibrary small covers, and appends the cache-busting token.
    /// Missing or unparseable input resolves to the placeholder.
    pub fn optimize(&self, url: Option<&str>) -> String {
        let Some(raw) = url.map(str::trim).filter(|u| !u.is_empty()) else {
            return self.placeholder.clone();
        };
        if Self::is_local(raw) {
            return raw.to_string();
        }
        let Ok(mut parsed) = Url::parse(raw) else {
            tracing::debug!(url = raw, "unparseable image URL; using placeholder");
            return self.placeholder.clone();
        };
        if parsed.scheme() == "http" && parsed.set_scheme("https").is_err() {
            return self.placeholder.clone();
        }

        match classify(&parsed) {
            Host::GoogleBooks => {
                rewrite_query(&mut parsed, |pairs| {
                    pairs.retain(|(k, _)| k != "edge");
                    match pairs.iter_mut().find(|(k, _)| k == "zoom") {
                        Some((_, zoom)) if zoom == "1" || zoom == "5" => *zoom = "0".to_string(),
                        Some(_) => {}
                        None => pairs.push(("zoom".to_string(), "0".to_string())),
                    }
                });
            }
            Host::OpenLibraryCovers => {
                let path = parsed.path().to_string();
                if let Some(stem) = path.strip_suffix("-S.jpg") {
                    parsed.set_path(&format!("{stem}-M.jpg"));
                }
            }
            Host::Other => {}
        }

        self.with_token(parsed, &self.cache_bust)
    }

    /// The URL to try on retry `attempt` (1-based) after `url` failed to load.
    pub fn retry_variant(&self, url: &str, attempt: u8) -> String {
        if Self::is_local(url) {
            return url.to_string();
        }
        let Ok(mut parsed) = Url::parse(url) else {
            return self.placeholder.clone();
        };

        match (classify(&parsed), attempt) {
            (Host::GoogleBooks, 1) => rewrite_query(&mut parsed, |pairs| {
                pairs.retain(|(k, _)| k != "edge" && k != "zoom");
                pairs.push(("zoom".to_string(), "1".to_string()));
            }),
            (Host::GoogleBooks, _) => rewrite_query(&mut parsed, |pairs| {
                pairs.retain(|(k, _)| k != "edge" && k != "zoom" && k != "fife");
                pairs.push(("fife".to_string(), "w480-h720".to_string()));
            }),
            (Host::OpenLibraryCovers, attempt) => {
                let size = if attempt == 1 { "M" } else { "S" };
                let path = parsed.path().to_string();
                let swapped = ["-L.jpg", "-M.jpg", "-S.jpg"]
                    .iter()
                    .find_map(|suffix| path.strip_suffix(suffix))
                    .map(|stem| format!("{stem}-{size}.jpg"));
                if let Some(path) = swapped {
                    parsed.set_path(&path);
                }
            }
            (Host::Other, _) => parsed.set_query(None),
        }

        let token = format!("{}-r{attempt}", self.cache_bust);
        self.with_token(parsed, &token)
    }

    /// A fallback cover for `key`, spread across the pool so a grid of
    /// failed covers does not show one repeated image.
    pub fn fallback_for(&self, key: &str) -> &'static str {
        let digest = Sha256::digest(key.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(bytes) % FALLBACK_POOL.len() as u64) as usize;
        FALLBACK_POOL[index]
    }

    fn with_token(&self, mut url: Url, token: &str) -> String {
        rewrite_query(&mut url, |pairs| {
            pairs.retain(|(k, _)| k != CACHE_BUST_PARAM);
            pairs.push((CACHE_BUST_PARAM.to_string(), token.to_string()));
        });
        url.to_string()
    }
}

fn rewrite_query(url: &mut Url, edit: impl FnOnce(&mut Vec<(String, String)>)) {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    edit(&mut pairs);
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
}
