use chrono::{DateTime, Utc};

use crate::model::Category;

/// Category slug and the lowercase fragments that map onto it, in match order.
pub const CATEGORY_KEYWORDS: [(&str, &[&str]); 8] = [
    ("african-literature", &["africa", "african"]),
    ("business", &["business", "marketing", "economics", "finance"]),
    ("health", &["health", "wellness", "fitness", "medical"]),
    (
        "self-help",
        &["self-help", "self", "help", "personal", "improvement", "development"],
    ),
    ("poetry", &["poet", "poem", "verse"]),
    ("history", &["history", "historical", "biography", "memoir"]),
    ("fiction", &["fiction", "novel", "fantasy", "sci-fi"]),
    ("non-fiction", &["non-fiction", "essay", "reference", "academic"]),
];

pub const DEFAULT_CATEGORY: &str = "fiction";
pub const POETRY: &str = "poetry";

/// Provider search query per category slug.
pub const CATEGORY_SEARCH_TERMS: [(&str, &str); 8] = [
    (
        "african-literature",
        "subject:fiction africa OR african literature -report -proceedings",
    ),
    ("poetry", "subject:poetry poems verse anthology -report -proceedings"),
    (
        "history",
        "subject:history biography memoir historical -report -proceedings",
    ),
    ("fiction", "subject:fiction novel bestseller -report -proceedings"),
    (
        "non-fiction",
        "subject:non-fiction essays journalism -report -proceedings",
    ),
    (
        "self-help",
        "subject:self-improvement motivation personal development -report -proceedings",
    ),
    (
        "business",
        "subject:business management entrepreneurship leadership -report -proceedings",
    ),
    (
        "health",
        "subject:health wellness fitness nutrition -report -proceedings",
    ),
];

const CATEGORY_NAMES: [(&str, &str); 8] = [
    ("african-literature", "African Literature"),
    ("poetry", "Poetry"),
    ("history", "History"),
    ("fiction", "Fiction"),
    ("non-fiction", "Non-Fiction"),
    ("self-help", "Self-Help"),
    ("business", "Business"),
    ("health", "Health"),
];

fn matches_in(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| lowered.contains(kw)))
        .map(|(slug, _)| slug.to_string())
        .collect()
}

/// Slugs for a record: provider tags first, then title and description, then
/// the default. Never empty, never duplicated.
pub fn infer_categories(tags: &[String], title: &str, description: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for tag in tags {
        for slug in matches_in(tag) {
            if !found.contains(&slug) {
                found.push(slug);
            }
        }
    }
    if found.is_empty() {
        found = matches_in(&format!("{title} {description}"));
    }
    if found.is_empty() {
        found.push(DEFAULT_CATEGORY.to_string());
    }
    found
}

pub fn search_query_for(slug: &str) -> String {
    CATEGORY_SEARCH_TERMS
        .iter()
        .find(|(s, _)| *s == slug)
        .map(|(_, query)| query.to_string())
        .unwrap_or_else(|| format!("subject:{slug} -report -proceedings"))
}

/// The fixed category list, stamped with `created_at`.
pub fn static_categories(created_at: DateTime<Utc>) -> Vec<Category> {
    CATEGORY_NAMES
        .iter()
        .map(|(slug, name)| Category {
            id: slug.to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
            created_at,
        })
        .collect()
}
