//! Title canonicalisation and similarity scoring.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s]").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

const SUMMARY: &str = "summary";

/// Canonical comparison form of a title.
///
/// Lowercases and trims, drops one trailing "summary" together with the
/// separators around it, turns punctuation into spaces and collapses runs of
/// whitespace.
pub fn normalize_title(title: &str) -> String {
    let mut t = title.to_lowercase().trim().to_string();
    if let Some(stripped) = t.strip_suffix(SUMMARY) {
        t = stripped.trim_matches(&[' ', '-', ':', ';', ',', '.'][..]).to_string();
    }
    let t = NON_WORD.replace_all(&t, " ");
    WHITESPACE.replace_all(&t, " ").trim().to_string()
}

/// Raw title with a trailing "summary" (any case) removed, for search variants.
///
/// Returns `None` when the title has no such suffix or nothing is left.
pub fn strip_summary_suffix(title: &str) -> Option<String> {
    let title = title.trim();
    let cut = title.len().checked_sub(SUMMARY.len())?;
    if !title.is_char_boundary(cut) || !title[cut..].eq_ignore_ascii_case(SUMMARY) {
        return None;
    }
    let stripped = title[..cut].trim_matches(&[' ', '-', ':', ';'][..]);
    (!stripped.is_empty()).then(|| stripped.to_string())
}

/// Ratcliff/Obershelp ratio in [0, 1]: `2·M / (|a| + |b|)`, where M counts the
/// characters in recursively found longest common blocks.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut pending = vec![(0, a.len(), 0, b.len())];
    let mut matched = 0;

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common block in `a[alo..ahi]` × `b[blo..bhi]`; the earliest block wins ties.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0);
    let width = bhi - blo + 1;
    let mut prev = vec![0usize; width];

    for i in alo..ahi {
        let mut cur = vec![0usize; width];
        for j in blo..bhi {
            if a[i] == b[j] {
                let k = prev[j - blo] + 1;
                cur[j - blo + 1] = k;
                if k > best_k {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_k = k;
                }
            }
        }
        prev = cur;
    }
    (best_i, best_j, best_k)
}
