//! Query term highlights over a hit's snippet.
//!
//! Each whitespace-separated query token is matched against the text three
//! ways, strongest first:
//!
//! 1. **exact**: the token as a whole word (case-insensitive).
//! 2. **stem**: the token as a substring of a longer word.
//! 3. **fuzzy**: a word whose similarity to the token is at least
//!    [`FUZZY_THRESHOLD`].
//!
//! Overlapping spans are resolved in favor of the stronger kind, so the
//! output is sorted by `start` and never overlaps. Offsets are character
//! (not byte) positions into the text, end-exclusive.

use serde::Serialize;

/// Minimum similarity ratio for a fuzzy match.
pub const FUZZY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightKind {
    Fuzzy,
    Stem,
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Highlight {
    pub start: usize,
    pub end: usize,
    pub kind: HighlightKind,
}

impl Highlight {
    fn overlaps(&self, start: usize, end: usize) -> bool {
        start < self.end && self.start < end
    }
}

/// Compute non-overlapping highlights of `query` in `text`.
pub fn compute_highlights(text: &str, query: &str) -> Vec<Highlight> {
    let tokens: Vec<Vec<char>> = query.split_whitespace().map(fold).collect();
    if tokens.is_empty() || text.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let lower: Vec<char> = chars.iter().map(|c| fold_char(*c)).collect();

    let mut found = Vec::new();
    for tok in &tokens {
        for start in occurrences(&lower, tok) {
            let end = start + tok.len();
            if is_boundary(&chars, start) && is_boundary(&chars, end) {
                found.push(Highlight {
                    start,
                    end,
                    kind: HighlightKind::Exact,
                });
            }
        }
    }

    for tok in &tokens {
        for start in occurrences(&lower, tok) {
            let end = start + tok.len();
            let covered = found
                .iter()
                .any(|h| h.kind == HighlightKind::Exact && h.overlaps(start, end));
            if !covered {
                found.push(Highlight {
                    start,
                    end,
                    kind: HighlightKind::Stem,
                });
            }
        }
    }

    let words = word_spans(&chars);
    for tok in &tokens {
        for &(start, end) in &words {
            if found.iter().any(|h| h.overlaps(start, end)) {
                continue;
            }
            if similarity(tok, &lower[start..end]) >= FUZZY_THRESHOLD {
                found.push(Highlight {
                    start,
                    end,
                    kind: HighlightKind::Fuzzy,
                });
            }
        }
    }

    merge(found)
}

/// Sort by start and drop overlaps, keeping the stronger kind.
fn merge(mut found: Vec<Highlight>) -> Vec<Highlight> {
    found.sort_by(|a, b| a.start.cmp(&b.start).then(b.kind.cmp(&a.kind)));

    let mut merged: Vec<Highlight> = Vec::with_capacity(found.len());
    for h in found {
        match merged.last_mut() {
            Some(last) if h.start < last.end => {
                if h.kind > last.kind {
                    *last = h;
                }
            }
            _ => merged.push(h),
        }
    }
    merged
}

fn fold(s: &str) -> Vec<char> {
    s.chars().map(fold_char).collect()
}

// One char in, one char out, so offsets stay aligned with the input text
fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// True where a word character meets a non-word character (or an edge).
fn is_boundary(chars: &[char], pos: usize) -> bool {
    let before = pos > 0 && is_word(chars[pos - 1]);
    let after = pos < chars.len() && is_word(chars[pos]);
    before != after
}

/// Non-overlapping start positions of `needle` in `haystack`.
fn occurrences(haystack: &[char], needle: &[char]) -> Vec<usize> {
    let mut out = Vec::new();
    if needle.is_empty() || needle.len() > haystack.len() {
        return out;
    }
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if haystack[i..i + needle.len()] == *needle {
            out.push(i);
            i += needle.len();
        } else {
            i += 1;
        }
    }
    out
}

/// `(start, end)` of every maximal run of word characters.
fn word_spans(chars: &[char]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in chars.iter().enumerate() {
        match (is_word(*c), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, chars.len()));
    }
    spans
}

/// `2 × matched / (len(a) + len(b))`, where `matched` sums the longest
/// common blocks found recursively on either side of each match.
pub fn similarity(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(a, b) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, len) = longest_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matched_chars(&a[..i], &b[..j]) + matched_chars(&a[i + len..], &b[j + len..])
}

/// Longest common substring as `(start in a, start in b, length)`.
///
/// Ties go to the earliest start in `a`, then in `b`.
fn longest_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    // prev[j + 1] = length of the common suffix ending at a[i - 1], b[j]
    let mut prev = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut row = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                let len = prev[j] + 1;
                row[j + 1] = len;
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            }
        }
        prev = row;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(text: &str, query: &str) -> Vec<(&'static str, String)> {
        let chars: Vec<char> = text.chars().collect();
        compute_highlights(text, query)
            .into_iter()
            .map(|h| {
                let kind = match h.kind {
                    HighlightKind::Exact => "exact",
                    HighlightKind::Stem => "stem",
                    HighlightKind::Fuzzy => "fuzzy",
                };
                (kind, chars[h.start..h.end].iter().collect())
            })
            .collect()
    }

    #[test]
    fn test_exact_word_matches_ignore_case() {
        assert_eq!(
            spans("Light curves: the light fades.", "light"),
            vec![("exact", "Light".to_string()), ("exact", "light".to_string())]
        );
    }

    #[test]
    fn test_substring_is_stem() {
        assert_eq!(
            spans("microlensing events", "lens"),
            vec![("stem", "lens".to_string())]
        );
    }

    #[test]
    fn test_fuzzy_word() {
        // A substring hit takes precedence over a fuzzy one
        let got = spans("two telescopes", "telescope");
        assert_eq!(got, vec![("stem", "telescope".to_string())]);

        // "colour" vs "color": 2*5/11
        assert_eq!(
            spans("the color index", "colour"),
            vec![("fuzzy", "color".to_string())]
        );
        assert!(spans("unrelated words", "colour").is_empty());
    }

    #[test]
    fn test_multiple_tokens_sorted_without_overlap() {
        let hl = compute_highlights("fit the light curve", "curve fit light");
        let starts: Vec<usize> = hl.iter().map(|h| h.start).collect();
        assert_eq!(starts, vec![0, 8, 14]);
        assert!(hl.iter().all(|h| h.kind == HighlightKind::Exact));
        assert!(hl.windows(2).all(|w| w[0].end <= w[1].start));
    }

    #[test]
    fn test_offsets_are_characters() {
        let hl = compute_highlights("héllo wörld", "wörld");
        assert_eq!(hl.len(), 1);
        assert_eq!((hl[0].start, hl[0].end), (6, 11));
    }

    fn hl(start: usize, end: usize, kind: HighlightKind) -> Highlight {
        Highlight { start, end, kind }
    }

    #[test]
    fn test_merge_prefers_stronger_kind() {
        let merged = merge(vec![
            hl(0, 6, HighlightKind::Fuzzy),
            hl(2, 4, HighlightKind::Exact),
            hl(8, 10, HighlightKind::Stem),
        ]);
        assert_eq!(
            merged,
            vec![hl(2, 4, HighlightKind::Exact), hl(8, 10, HighlightKind::Stem)]
        );
    }

    #[test]
    fn test_empty_inputs() {
        assert!(compute_highlights("", "query").is_empty());
        assert!(compute_highlights("text", "   ").is_empty());
    }

    #[test]
    fn test_similarity() {
        let a: Vec<char> = "abcd".chars().collect();
        let b: Vec<char> = "bcde".chars().collect();
        assert!((similarity(&a, &b) - 0.75).abs() < 1e-12);
        assert_eq!(similarity(&a, &a), 1.0);
    }
}
