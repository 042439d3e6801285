//! Query tokenization and result acceptance.
//!
//! The query and every candidate text go through the same [`normalize`]
//! pipeline, so comparisons are made between equally folded strings.
use crate::result::SearchResult;
use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref TAG: Regex = Regex::new(r"<[^>]*>").expect("tag pattern");
}

const NOISE_WORDS: &[&str] = &[".torrent", "www.", ".com", ".net"];

const EXTRA_SEPARATORS: &[char] = &['¡', '¿', 'Ð', '«', '»', '·', '–', '—', '‘', '’', '“', '”', '…'];

/// Folds `text` for keyword comparison: tags and entities removed,
/// diacritics stripped, lower-cased, separators turned into single spaces.
pub fn normalize(text: &str) -> String {
    let without_tags = TAG.replace_all(text, " ");
    let decoded = html_escape::decode_html_entities(&without_tags);
    let mut folded = fold(&decoded);

    for noise in NOISE_WORDS {
        if folded.contains(noise) {
            folded = folded.replace(noise, " ");
        }
    }

    let spaced: String = folded
        .chars()
        .map(|c| {
            if c.is_ascii_punctuation() || EXTRA_SEPARATORS.contains(&c) {
                ' '
            } else {
                c
            }
        })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

// NFKD + drop combining marks + lowercase, repeated until stable
fn fold(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..4 {
        let next: String = current
            .nfkd()
            .filter(|c| !is_combining_mark(*c))
            .collect::<String>()
            .to_lowercase();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Normalized, de-duplicated query tokens in their original order.
pub fn tokenize(query: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for word in normalize(query).split_whitespace() {
        if !tokens.iter().any(|t| t == word) {
            tokens.push(word.to_string());
        }
    }
    tokens
}

/// Text a result is matched against: its display name, its filename
/// and, for crawled results, the parent's display name.
pub fn candidate_text(result: &SearchResult) -> String {
    let mut parts = vec![result.display_name()];
    if let Some(filename) = result.filename() {
        parts.push(filename);
    }
    if let Some(parent) = result.parent() {
        parts.push(parent.display_name());
    }
    parts.join(" ")
}

/// AND filter over the tokens of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordFilter {
    tokens: Vec<String>,
}

impl KeywordFilter {
    pub fn new(query: &str) -> Self {
        Self {
            tokens: tokenize(query),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn accepts_text(&self, text: &str) -> bool {
        let normalized = normalize(text);
        self.tokens.iter().all(|token| normalized.contains(token.as_str()))
    }

    pub fn accepts(&self, result: &SearchResult) -> bool {
        self.accepts_text(&candidate_text(result))
    }
}

/// Whether every token of `query` occurs in `text`.
pub fn accept(query: &str, text: &str) -> bool {
    KeywordFilter::new(query).accepts_text(text)
}
