//! Text preprocessing for recommendation queries.
//!
//! Review text arrives as free-form Korean prose. Before embedding we:
//! 1. Bound long text with an extractive summary (first/last/longest units)
//! 2. Extract candidate keywords (runs of 2+ Hangul syllables, stopwords out)
//! 3. Build adjacent-word bigrams for the phrase-level signal
//!
//! All functions here are pure and deterministic; lengths are counted in
//! characters, not bytes.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Ellipsis suffix when a summary is hard-truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Sentence units longer than this get split again on commas/connectives
const LONG_UNIT_THRESHOLD: usize = 100;

/// Sentence-final delimiters: punctuation followed by space or newline
const SENTENCE_DELIMITERS: [&str; 6] = [". ", "! ", "? ", ".\n", "!\n", "?\n"];

/// Sub-delimiters applied to overlong sentence units
const SUB_DELIMITERS: [&str; 3] = [", ", "그리고 ", "하지만 "];

/// Runs of 2 or more Hangul syllables
static HANGUL_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[가-힣]{2,}").unwrap());

/// Connectives, intensity adverbs and determiners that carry no tag signal
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "그래서", "그리고", "하지만", "그런데", "그러나", "또한", "그냥", "정말", "진짜",
        "너무", "아주", "매우", "조금", "좀더", "다시", "또다시", "계속", "항상", "언제나",
        "모든", "전체", "일부", "어떤", "이런", "저런", "그런",
    ]
    .into_iter()
    .collect()
});

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn last_chars(s: &str, n: usize) -> String {
    let total = char_len(s);
    s.chars().skip(total.saturating_sub(n)).collect()
}

/// Produce a bounded-length extractive summary of `text`.
///
/// Text at or under `max_length` characters is returned unchanged. Longer
/// text is split into sentence-like units; overlong units are split again on
/// commas and connectives. The summary keeps the first 2 units, the last 2
/// (when at least 3 exist), and the 2 longest of the remaining middle units
/// (when more than 4 exist), joined in that selection order. A result still
/// over the limit is hard-truncated with an ellipsis.
pub fn summarize(text: &str, max_length: usize) -> String {
    if char_len(text) <= max_length {
        return text.to_string();
    }

    let mut marked = text.to_string();
    for delim in SENTENCE_DELIMITERS {
        marked = marked.replace(delim, "\u{1}");
    }

    let mut units: Vec<String> = Vec::new();
    for raw in marked.split('\u{1}') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        if char_len(raw) > LONG_UNIT_THRESHOLD {
            let mut sub = raw.to_string();
            for delim in SUB_DELIMITERS {
                sub = sub.replace(delim, "\u{1}");
            }
            units.extend(
                sub.split('\u{1}')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            );
        } else {
            units.push(raw.to_string());
        }
    }

    if units.is_empty() {
        let half = max_length / 2;
        return format!("{} {}", take_chars(text, half), last_chars(text, half));
    }

    let mut selected: Vec<&str> = Vec::new();
    selected.extend(units.iter().take(2).map(String::as_str));
    if units.len() >= 3 {
        selected.extend(units.iter().skip(units.len() - 2).map(String::as_str));
    }
    if units.len() > 4 {
        let mut middle: Vec<&str> = units[2..units.len() - 2].iter().map(String::as_str).collect();
        // stable sort keeps document order among equal lengths
        middle.sort_by_key(|u| std::cmp::Reverse(char_len(u)));
        selected.extend(middle.into_iter().take(2));
    }

    let summary = selected.join(" ");
    if char_len(&summary) > max_length {
        format!("{}{}", take_chars(&summary, max_length), TRUNCATION_SUFFIX)
    } else {
        summary
    }
}

/// Extract candidate keyword tokens from `text`.
///
/// Text over `max_length` characters is summarized first. Tokens are maximal
/// runs of 2+ Hangul syllables, minus the stopword set, in first-occurrence
/// order with duplicates removed.
pub fn extract_keywords(text: &str, max_length: usize) -> Vec<String> {
    let text = if char_len(text) > max_length {
        summarize(text, max_length)
    } else {
        text.to_string()
    };

    let mut seen = HashSet::new();
    let mut words = Vec::new();
    for m in HANGUL_WORD.find_iter(&text) {
        let word = m.as_str();
        if STOPWORDS.contains(word) || char_len(word) <= 1 {
            continue;
        }
        if seen.insert(word.to_string()) {
            words.push(word.to_string());
        }
    }
    words
}

/// Adjacent-word bigrams over `tokens`, space-joined.
pub fn bigrams(tokens: &[String]) -> Vec<String> {
    if tokens.len() < 2 {
        return vec![];
    }
    tokens
        .windows(2)
        .map(|pair| format!("{} {}", pair[0], pair[1]))
        .collect()
}
