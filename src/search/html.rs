//! Helpers shared by HTML-scraping patterns and crawlers.
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

lazy_static! {
    static ref CHALLENGE_MARKERS: AhoCorasick = AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostFirst)
        .build([
            "cf-browser-verification",
            "<title>Just a moment...</title>",
            "Attention Required! | Cloudflare",
        ])
        .expect("challenge markers");
    static ref MAGNET_HASH: Regex =
        Regex::new(r"(?i)urn:btih:([0-9a-f]{40}|[a-z2-7]{32})").expect("magnet hash pattern");
}

/// Offsets bounding the listing part of a page, found by marker strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerBounds {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

impl MarkerBounds {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            suffix: Some(suffix.into()),
        }
    }

    /// `Some(0)` / `Some(len)` for a missing marker setting; `None` when a
    /// configured marker is absent from `html`.
    pub fn offsets(&self, html: &str) -> (Option<usize>, Option<usize>) {
        let prefix = match &self.prefix {
            Some(marker) => memchr::memmem::find(html.as_bytes(), marker.as_bytes()),
            None => Some(0),
        };
        let suffix = match &self.suffix {
            Some(marker) => {
                let from = prefix.unwrap_or(0);
                memchr::memmem::find(&html.as_bytes()[from..], marker.as_bytes())
                    .map(|offset| from + offset)
            }
            None => Some(html.len()),
        };
        (prefix, suffix)
    }

    pub fn is_unbounded(&self) -> bool {
        self.prefix.is_none() && self.suffix.is_none()
    }

    /// The bounded part of `html`, or `None` when it cannot be located.
    pub fn reduce<'a>(&self, html: &'a str) -> Option<&'a str> {
        if self.is_unbounded() {
            return Some(html);
        }
        let (prefix, suffix) = self.offsets(html);
        reduce_html(html, prefix, suffix)
    }
}

/// `html[prefix..suffix]`, or `None` when an offset is missing or the
/// range is inverted.
pub fn reduce_html(html: &str, prefix: Option<usize>, suffix: Option<usize>) -> Option<&str> {
    let (Some(prefix), Some(suffix)) = (prefix, suffix) else {
        return None;
    };
    if prefix > suffix {
        warn!(
            "Can't reduce html: prefix offset {} is past suffix offset {}",
            prefix, suffix
        );
        return None;
    }
    html.get(prefix..suffix)
}

/// False for anti-bot challenge pages. Markers that also show up on normal
/// pages belong in a source's own blocked markers.
pub fn is_valid_html(body: &str) -> bool {
    !CHALLENGE_MARKERS.is_match(body)
}

/// A body with nothing but whitespace.
pub fn is_blank(body: &str) -> bool {
    body.trim().is_empty()
}

/// Like [`is_valid_html`], additionally rejecting any of `extra_markers`.
pub fn is_valid_html_with(body: &str, extra_markers: &[&str]) -> bool {
    is_valid_html(body)
        && !extra_markers
            .iter()
            .any(|m| memchr::memmem::find(body.as_bytes(), m.as_bytes()).is_some())
}

/// Decodes HTML entities and trims.
pub fn decode_text(text: &str) -> String {
    html_escape::decode_html_entities(text).trim().to_string()
}

/// Lower-case hex info hash of a magnet link.
pub fn parse_info_hash(magnet: &str) -> Option<String> {
    let captures = MAGNET_HASH.captures(magnet)?;
    normalize_info_hash(captures.get(1)?.as_str())
}

/// Lower-case hex form of a 40-char hex or 32-char base32 info hash.
pub fn normalize_info_hash(hash: &str) -> Option<String> {
    let hash = hash.trim();
    if hash.len() == 40 && hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Some(hash.to_ascii_lowercase());
    }
    if hash.len() == 32 {
        let bytes = decode_base32(hash)?;
        return Some(bytes.iter().map(|b| format!("{b:02x}")).collect());
    }
    None
}

fn decode_base32(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits = 0;
    for c in text.bytes() {
        let value = match c.to_ascii_uppercase() {
            c @ b'A'..=b'Z' => c - b'A',
            c @ b'2'..=b'7' => c - b'2' + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | u64::from(value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }
    Some(out)
}

/// Digits of a seed/peer cell; anything else is 0.
pub fn parse_count(text: &str) -> i32 {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}
