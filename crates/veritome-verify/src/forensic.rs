//! Forensic author-token extraction.
//!
//! The first lines of an extracted guideline usually carry the author block.
//! Alphabetic runs longer than three characters from those lines form a weak
//! signature that can corroborate a title match. It is never enough on its own.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

/// Number of leading lines scanned for author tokens.
pub const HEADER_LINES: usize = 10;

/// Tokens of this length or shorter are ignored.
const MIN_TOKEN_EXCLUSIVE: usize = 3;

lazy_static! {
    static ref ALPHA_RUN: Regex = Regex::new(r"[A-Za-z]+").unwrap();
}

/// Lines split on `\r\n`, `\n` or a bare `\r`.
fn header_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split("\r\n").flat_map(|chunk| chunk.split(['\n', '\r']))
}

/// Ordered, de-duplicated set of lowercase author tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorTokens {
    ordered: Vec<String>,
    seen: HashSet<String>,
}

impl AuthorTokens {
    /// Tokens from the first [`HEADER_LINES`] lines of a document.
    pub fn from_text(text: &str) -> Self {
        let mut tokens = Self::default();
        for line in header_lines(text).take(HEADER_LINES) {
            tokens.extend_from(line);
        }
        tokens
    }

    /// Tokens from registry author names ("Last, First").
    pub fn from_authors(authors: &[String]) -> Self {
        let mut tokens = Self::default();
        for author in authors {
            tokens.extend_from(author);
        }
        tokens
    }

    fn extend_from(&mut self, fragment: &str) {
        for run in ALPHA_RUN.find_iter(fragment) {
            if run.as_str().len() > MIN_TOKEN_EXCLUSIVE {
                let token = run.as_str().to_lowercase();
                if self.seen.insert(token.clone()) {
                    self.ordered.push(token);
                }
            }
        }
    }

    /// First token in document order.
    pub fn first(&self) -> Option<&str> {
        self.ordered.first().map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.seen.contains(token)
    }

    pub fn intersects(&self, other: &AuthorTokens) -> bool {
        let (small, large) = if self.len() <= other.len() { (self, other) } else { (other, self) };
        small.ordered.iter().any(|t| large.contains(t))
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(String::as_str)
    }
}
