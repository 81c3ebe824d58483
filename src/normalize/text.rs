use regex::Regex;
use std::sync::OnceLock;

/// Title fragments that mark periodicals, reports and other records we
/// cannot sell as books.
pub const NON_BOOK_KEYWORDS: [&str; 12] = [
    "bulletin",
    "report",
    "proceedings",
    "publication",
    "catalog",
    "journal",
    "technical report",
    "newsletter",
    "press clips",
    "vasectomy",
    "soil moisture",
    "resources in education",
];

fn tag_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag regex"))
}

fn whitespace_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

fn repeated_quote_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r#""{2,}"#).expect("valid quote regex"))
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Plain-text version of a provider description.
pub fn clean_description(raw: &str) -> String {
    let decoded = decode_entities(raw);
    let stripped = tag_regex().replace_all(&decoded, "");
    let collapsed = whitespace_regex().replace_all(&stripped, " ");
    repeated_quote_regex()
        .replace_all(collapsed.trim(), "\"")
        .into_owned()
}

pub fn with_author_bio(description: String, bio: Option<&str>) -> String {
    match bio.map(clean_description).filter(|b| !b.is_empty()) {
        Some(bio) => format!("{description}\n\nAbout the author: {bio}"),
        None => description,
    }
}

pub fn title_looks_like_non_book(title: &str) -> bool {
    let lowered = title.to_lowercase();
    NON_BOOK_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

/// A record is dropped when it has no title, when its title reads like a
/// periodical or report, or when it names neither an author nor a publisher.
pub fn is_non_book(title: &str, has_author: bool, has_publisher: bool) -> bool {
    title.trim().is_empty() || title_looks_like_non_book(title) || (!has_author && !has_publisher)
}
