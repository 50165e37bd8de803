use nucleo_matcher::pattern::{Atom, AtomKind, CaseMatching, Normalization};
use nucleo_matcher::{Config, Matcher, Utf32Str};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::Range;

/// How a query matched a piece of text. Variants are declared best-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MatchKind {
    /// The query occurs as a contiguous, case-insensitive substring.
    Exact,
    /// Every query character occurs in order, not necessarily contiguously.
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMatch {
    pub kind: MatchKind,
    /// Matched character span (char offsets, end exclusive).
    pub range: Range<usize>,
    pub score: u16,
}

/// Matches a single query against many candidate strings.
///
/// Substring matching is tried first and fuzzy subsequence matching second,
/// both case-insensitive.
pub struct SearchMatcher {
    // Nucleo matcher shared by both atoms
    matcher: Matcher,
    substring: Atom,
    fuzzy: Atom,
    query: String,
    char_buf: Vec<char>,
    indices: Vec<u32>,
}

impl SearchMatcher {
    /// Returns `None` for an empty or whitespace-only query.
    pub fn new(query: &str) -> Option<Self> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        let substring = Atom::new(
            query,
            CaseMatching::Ignore,
            Normalization::Smart,
            AtomKind::Substring,
            false,
        );
        let fuzzy = Atom::new(
            query,
            CaseMatching::Ignore,
            Normalization::Smart,
            AtomKind::Fuzzy,
            false,
        );

        Some(Self {
            matcher: Matcher::new(Config::DEFAULT),
            substring,
            fuzzy,
            query: query.to_string(),
            char_buf: Vec::new(),
            indices: Vec::new(),
        })
    }

    /// The trimmed query this matcher was built from.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn match_text(&mut self, text: &str) -> Option<TextMatch> {
        if text.is_empty() {
            return None;
        }

        self.indices.clear();
        let haystack = Utf32Str::new(text, &mut self.char_buf);
        if let Some(score) = self
            .substring
            .indices(haystack, &mut self.matcher, &mut self.indices)
        {
            return self.build_match(MatchKind::Exact, score);
        }

        self.indices.clear();
        let haystack = Utf32Str::new(text, &mut self.char_buf);
        if let Some(score) = self
            .fuzzy
            .indices(haystack, &mut self.matcher, &mut self.indices)
        {
            return self.build_match(MatchKind::Fuzzy, score);
        }

        None
    }

    /// Best match across several fields, returning the winning field's index.
    pub fn match_best<'a, I>(&mut self, fields: I) -> Option<(usize, TextMatch)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut best: Option<(usize, TextMatch)> = None;
        for (field_idx, text) in fields.into_iter().enumerate() {
            let Some(found) = self.match_text(text) else {
                continue;
            };
            let better = match &best {
                Some((_, current)) => found.kind < current.kind,
                None => true,
            };
            if better {
                let exact = found.kind == MatchKind::Exact;
                best = Some((field_idx, found));
                if exact {
                    break;
                }
            }
        }
        best
    }

    fn build_match(&self, kind: MatchKind, score: u16) -> Option<TextMatch> {
        let start = self.indices.iter().copied().min()? as usize;
        let end = self.indices.iter().copied().max()? as usize + 1;
        Some(TextMatch {
            kind,
            range: start..end,
            score,
        })
    }
}

/// Most-recent-first query history without duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHistory {
    entries: VecDeque<String>,
    capacity: usize,
}

impl Default for SearchHistory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl SearchHistory {
    pub const DEFAULT_CAPACITY: usize = 10;

    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            return;
        }
        self.entries.retain(|existing| existing != query);
        self.entries.push_front(query.to_string());
        self.entries.truncate(self.capacity);
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_queries_build_no_matcher() {
        assert!(SearchMatcher::new("").is_none());
        assert!(SearchMatcher::new("   \t").is_none());
    }

    #[test]
    fn substring_match_is_case_insensitive_with_range() {
        let mut matcher = SearchMatcher::new("javascript").unwrap();
        let found = matcher.match_text("JavaScript Function").unwrap();
        assert_eq!(found.kind, MatchKind::Exact);
        assert_eq!(found.range, 0..10);

        let found = matcher.match_text("Run JAVASCRIPT").unwrap();
        assert_eq!(found.range, 4..14);
    }

    #[test]
    fn subsequence_match_is_fuzzy() {
        let mut matcher = SearchMatcher::new("jsfn").unwrap();
        let found = matcher.match_text("JavaScript Function").unwrap();
        assert_eq!(found.kind, MatchKind::Fuzzy);
        assert_eq!(found.range.start, 0);

        assert!(matcher.match_text("Python").is_none());
    }

    #[test]
    fn out_of_order_characters_do_not_match() {
        let mut matcher = SearchMatcher::new("cba").unwrap();
        assert!(matcher.match_text("abc").is_none());
    }

    #[test]
    fn best_field_prefers_exact() {
        let mut matcher = SearchMatcher::new("parse").unwrap();
        let (field, found) = matcher
            .match_best(["p_a_r_s_e", "json parser"])
            .unwrap();
        assert_eq!(field, 1);
        assert_eq!(found.kind, MatchKind::Exact);
    }

    #[test]
    fn history_is_capped_unique_and_most_recent_first() {
        let mut history = SearchHistory::default();
        for i in 0..12 {
            history.push(&format!("query{i}"));
        }
        history.push("query5");

        let entries = history.to_vec();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[0], "query5");
        assert_eq!(entries[1], "query11");
        assert_eq!(entries.iter().filter(|q| *q == "query5").count(), 1);
    }
}
