//! Listing text normalization.
//!
//! Strips markup, decodes entities (twice, since catalog exports are often
//! double-escaped), keeps only Latin letters, Latin-1 accented letters,
//! digits and whitespace, collapses whitespace and lower-cases. The result
//! is a fixed point: normalizing it again changes nothing.

use scraper::Html;
use serde_json::Value;

/// Normalize raw listing text.
pub fn normalize(raw: &str) -> String {
    let visible = visible_text(raw);
    let decoded = decode_entities(&visible);

    let filtered: String = decoded
        .chars()
        .map(|c| if is_kept(c) { c } else { ' ' })
        .collect();

    filtered.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Absent text normalizes to the empty string.
pub fn normalize_opt(raw: Option<&str>) -> String {
    raw.map(normalize).unwrap_or_default()
}

/// Only JSON strings carry text; every other value normalizes to "".
pub fn normalize_value(raw: &Value) -> String {
    match raw {
        Value::String(s) => normalize(s),
        _ => String::new(),
    }
}

/// Text nodes of an HTML fragment joined by single spaces.
fn visible_text(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    fragment.root_element().text().collect::<Vec<_>>().join(" ")
}

/// Decode entities left over after markup extraction.
///
/// `<` is escaped first so the text cannot be re-read as markup.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let escaped = text.replace('<', "&lt;");
    let fragment = Html::parse_fragment(&escaped);
    fragment.root_element().text().collect()
}

fn is_kept(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c.is_whitespace()
        || ('\u{C0}'..='\u{D6}').contains(&c)
        || ('\u{D8}'..='\u{F6}').contains(&c)
        || ('\u{F8}'..='\u{FF}').contains(&c)
}
