//! Case-insensitive page search and literal replacement.
//!
//! Queries are always literal text. Replacement compiles the escaped query into a
//! case-insensitive regex and expands the replacement without capture-group substitution, so
//! inputs like `a.b`, `(x)` or `$1` mean exactly what they say. Queries too large for a
//! compiled regex are replaced by a lowercase substring scan instead.
//!
//! Search folds with `to_lowercase`, the regex path with simple case folding. They differ on a
//! few characters such as `ſ`, which the regex path treats as `s`.

use regex::{NoExpand, Regex, RegexBuilder};
use tracing::debug;

/// Ascending 1-based numbers of pages containing `query`, ignoring case. An empty query
/// matches nothing.
pub fn find_matches<S: AsRef<str>>(pages: &[S], query: &str) -> Vec<usize> {
    if query.is_empty() {
        return Vec::new();
    }
    let needle = query.to_lowercase();
    pages
        .iter()
        .enumerate()
        .filter(|(_, page)| page.as_ref().to_lowercase().contains(&needle))
        .map(|(idx, _)| idx + 1)
        .collect()
}

pub fn join_page_numbers(pages: &[usize]) -> String {
    pages
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

const REPLACE_SIZE_LIMIT: usize = 64 * (1 << 20);

#[derive(Debug, Clone)]
pub struct LiteralReplacer {
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Pattern(Regex),
    /// Lowercased query, used when the escaped query does not fit in a compiled regex.
    Lowercase(String),
}

impl LiteralReplacer {
    /// Returns `None` for an empty query.
    pub fn new(query: &str) -> Option<Self> {
        if query.is_empty() {
            return None;
        }
        let matcher = match RegexBuilder::new(&regex::escape(query))
            .case_insensitive(true)
            .size_limit(REPLACE_SIZE_LIMIT)
            .build()
        {
            Ok(pattern) => Matcher::Pattern(pattern),
            Err(err) => {
                debug!(
                    error = %err,
                    query_len = query.len(),
                    "query too large for a regex, using substring replace"
                );
                Matcher::Lowercase(query.to_lowercase())
            }
        };
        Some(Self { matcher })
    }

    pub fn replace_all(&self, text: &str, replacement: &str) -> String {
        match &self.matcher {
            Matcher::Pattern(pattern) => pattern
                .replace_all(text, NoExpand(replacement))
                .into_owned(),
            Matcher::Lowercase(needle) => replace_lowercase(text, needle, replacement),
        }
    }
}

/// Replaces every non-overlapping run of `text` whose lowercase form equals `needle`.
fn replace_lowercase(text: &str, needle: &str, replacement: &str) -> String {
    if needle.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while !rest.is_empty() {
        if let Some(len) = lowercase_prefix_len(rest, needle) {
            out.push_str(replacement);
            rest = &rest[len..];
            continue;
        }
        let mut chars = rest.chars();
        if let Some(ch) = chars.next() {
            out.push(ch);
        }
        rest = chars.as_str();
    }
    out
}

/// Byte length of the prefix of `text` that lowercases to `needle`, ending on a char boundary.
fn lowercase_prefix_len(text: &str, needle: &str) -> Option<usize> {
    let mut remaining = needle;
    for (idx, ch) in text.char_indices() {
        if remaining.is_empty() {
            return Some(idx);
        }
        for lower in ch.to_lowercase() {
            remaining = remaining.strip_prefix(lower)?;
        }
    }
    remaining.is_empty().then_some(text.len())
}
