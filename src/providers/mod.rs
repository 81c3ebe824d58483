//! Book metadata providers and their validated record shapes.

pub mod google_books;
pub mod open_library;

pub use google_books::GoogleBooksClient;
pub use open_library::OpenLibraryClient;

use google_books::Volume;
use open_library::{Author, SearchDoc, Work};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub const GOOGLE_NAMESPACE: &str = "google";
pub const OPEN_LIBRARY_NAMESPACE: &str = "openlibrary";

/// A provider record after schema validation, tagged by where it came from.
#[derive(Debug, Clone)]
pub enum RawRecord {
    GoogleVolume(Volume),
    OpenLibraryDoc(SearchDoc),
    OpenLibraryWork {
        id: String,
        work: Work,
        author: Option<Author>,
    },
}

/// A parsed `namespace:id` book identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookRef<'a> {
    Google(&'a str),
    OpenLibrary(&'a str),
}

impl<'a> BookRef<'a> {
    /// Ids without a known namespace are taken to be Google volume ids.
    pub fn parse(id: &'a str) -> Option<Self> {
        let id = id.trim();
        let parsed = match id.split_once(':') {
            Some((GOOGLE_NAMESPACE, rest)) => BookRef::Google(rest),
            Some((OPEN_LIBRARY_NAMESPACE, rest)) => BookRef::OpenLibrary(rest),
            _ => BookRef::Google(id),
        };
        match parsed {
            BookRef::Google(rest) | BookRef::OpenLibrary(rest) if rest.is_empty() => None,
            other => Some(other),
        }
    }
}

pub fn google_id(volume_id: &str) -> String {
    format!("{GOOGLE_NAMESPACE}:{volume_id}")
}

pub fn open_library_id(work_id: &str) -> String {
    format!("{OPEN_LIBRARY_NAMESPACE}:{work_id}")
}

/// Reads a JSON array item by item, keeping the entries that match `T` and
/// dropping the rest. A missing or `null` array reads as empty.
pub(crate) fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::debug!(error = %err, "dropping malformed provider record");
                None
            }
        })
        .collect())
}
