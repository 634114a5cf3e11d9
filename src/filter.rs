//! Content filter
//!
//! Masks forbidden words in inbound text and pulls out `@nickname`
//! mention tokens.

use std::sync::LazyLock;

use regex::Regex;

/// Replacement for every forbidden word occurrence
pub const MASK: &str = "**";

/// `@` followed by 2-20 characters that are neither whitespace nor `@`
static MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@[^\s@]{2,20}").expect("Invalid mention pattern regex"));

#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    words: Vec<String>,
}

impl ContentFilter {
    /// Build a filter from the configured word list; empty entries are dropped
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words = words
            .into_iter()
            .map(Into::into)
            .filter(|w: &String| !w.is_empty())
            .collect();
        Self { words }
    }

    /// Replace every occurrence of each forbidden word with [`MASK`],
    /// word by word in configured order
    pub fn filter_sensitive(&self, text: &str) -> String {
        self.words
            .iter()
            .fold(text.to_string(), |acc, word| acc.replace(word.as_str(), MASK))
    }

    /// Mention tokens in order of appearance, duplicates kept
    pub fn extract_mentions(text: &str) -> Vec<String> {
        MENTION_PATTERN
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_masks_each_occurrence() {
        let filter = ContentFilter::new(["foo", "bar"]);
        assert_eq!(filter.filter_sensitive("foo and bar and foo"), "** and ** and **");
    }

    #[test]
    fn test_filter_ignores_empty_words() {
        let filter = ContentFilter::new(["", "x"]);
        assert_eq!(filter.filter_sensitive("axb"), "a**b");
    }

    #[test]
    fn test_filter_without_words_is_identity() {
        let filter = ContentFilter::default();
        assert_eq!(filter.filter_sensitive("hello"), "hello");
    }

    #[test]
    fn test_extract_mentions_in_order() {
        let mentions = ContentFilter::extract_mentions("hi @alice and @bob, @alice again");
        assert_eq!(mentions, vec!["@alice", "@bob,", "@alice"]);
    }

    #[test]
    fn test_extract_mentions_length_bounds() {
        assert!(ContentFilter::extract_mentions("@a").is_empty());
        assert_eq!(ContentFilter::extract_mentions("@ab"), vec!["@ab"]);

        let long = format!("@{}", "x".repeat(25));
        let mentions = ContentFilter::extract_mentions(&long);
        assert_eq!(mentions, vec![format!("@{}", "x".repeat(20))]);
    }

    #[test]
    fn test_extract_mentions_stops_at_at_sign() {
        assert_eq!(ContentFilter::extract_mentions("@ann@bob"), vec!["@ann", "@bob"]);
    }
}
