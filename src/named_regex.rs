//! Named capture groups layered over the standard `regex` engine.
//!
//! Source definitions write their listing patterns with `(?<name>...)` groups.
//! Compiling such a pattern records, for every name, the index of the capturing
//! group it opens (found by counting the capturing left parentheses before it),
//! then rewrites each named opening into a plain `(` and hands the result to
//! [`regex::Regex`]. Names may repeat; every occurrence is tracked in order.
use crate::error::{Result, SearchError};
use regex::{Captures, Regex, RegexBuilder};
use std::collections::HashMap;
use std::fmt;

const REGEX_SIZE_LIMIT: usize = 32 * (1 << 20);

/// Location of one named group inside a pattern string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupInfo {
    group_index: usize,
    position: usize,
}

impl GroupInfo {
    /// Zero-based count of capturing groups opened before this one.
    pub fn group_index(&self) -> usize {
        self.group_index
    }

    /// Byte offset of the group's opening parenthesis in the named pattern.
    pub fn position(&self) -> usize {
        self.position
    }
}

/// Compile-time switches forwarded to the backing engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PatternFlags {
    pub case_insensitive: bool,
    pub dot_matches_new_line: bool,
    pub multi_line: bool,
}

impl PatternFlags {
    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    pub fn dot_matches_new_line(mut self) -> Self {
        self.dot_matches_new_line = true;
        self
    }

    pub fn multi_line(mut self) -> Self {
        self.multi_line = true;
        self
    }
}

struct NamedOpening {
    name: String,
    info: GroupInfo,
    end: usize,
}

/// A compiled named-group pattern.
#[derive(Clone)]
pub struct Pattern {
    named_pattern: String,
    flags: PatternFlags,
    regex: Regex,
    anchored: Regex,
    group_names: Vec<String>,
    group_info: HashMap<String, Vec<GroupInfo>>,
}

impl Pattern {
    pub fn compile(named_pattern: &str) -> Result<Self> {
        Self::compile_with_flags(named_pattern, PatternFlags::default())
    }

    pub fn compile_with_flags(named_pattern: &str, flags: PatternFlags) -> Result<Self> {
        let openings = scan_named_openings(named_pattern);

        let mut group_names = Vec::new();
        let mut group_info: HashMap<String, Vec<GroupInfo>> = HashMap::new();
        for opening in &openings {
            if !group_info.contains_key(&opening.name) {
                group_names.push(opening.name.clone());
            }
            group_info
                .entry(opening.name.clone())
                .or_default()
                .push(opening.info);
        }

        let standard = rewrite_openings(named_pattern, &openings);
        let regex = build_regex(&standard, flags)?;
        let anchored = build_regex(&format!(r"\A(?:{standard})\z"), flags)?;

        Ok(Self {
            named_pattern: named_pattern.to_string(),
            flags,
            regex,
            anchored,
            group_names,
            group_info,
        })
    }

    pub fn matcher<'p, 't>(&'p self, input: &'t str) -> Matcher<'p, 't> {
        Matcher::new(self, input)
    }

    /// Zero-based capture index of the first group declared as `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index_of_nth(name, 0)
    }

    /// Zero-based capture index of the `nth` group declared as `name`.
    pub fn index_of_nth(&self, name: &str, nth: usize) -> Option<usize> {
        self.group_info
            .get(name)
            .and_then(|list| list.get(nth))
            .map(GroupInfo::group_index)
    }

    pub fn is_match(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }

    pub fn split<'t>(&self, input: &'t str) -> Vec<&'t str> {
        self.regex.split(input).collect()
    }

    pub fn flags(&self) -> PatternFlags {
        self.flags
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// The rewritten pattern handed to the backing engine.
    pub fn standard_pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn named_pattern(&self) -> &str {
        &self.named_pattern
    }

    /// Declared names in order of first appearance.
    pub fn group_names(&self) -> &[String] {
        &self.group_names
    }

    pub fn group_info(&self) -> &HashMap<String, Vec<GroupInfo>> {
        &self.group_info
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("named_pattern", &self.named_pattern)
            .field("flags", &self.flags)
            .field("group_names", &self.group_names)
            .finish()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.named_pattern)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.named_pattern == other.named_pattern && self.flags == other.flags
    }
}

impl Eq for Pattern {}

/// Stateful cursor over one input, in the style of `find()`/`group()` loops.
pub struct Matcher<'p, 't> {
    pattern: &'p Pattern,
    input: &'t str,
    next_pos: usize,
    captures: Option<Captures<'t>>,
}

impl<'p, 't> Matcher<'p, 't> {
    fn new(pattern: &'p Pattern, input: &'t str) -> Self {
        Self {
            pattern,
            input,
            next_pos: 0,
            captures: None,
        }
    }

    pub fn pattern(&self) -> &'p Pattern {
        self.pattern
    }

    pub fn input(&self) -> &'t str {
        self.input
    }

    pub fn reset(&mut self) -> &mut Self {
        self.next_pos = 0;
        self.captures = None;
        self
    }

    /// Advances to the next match after the previous one.
    pub fn find(&mut self) -> bool {
        if self.next_pos > self.input.len() {
            self.captures = None;
            return false;
        }
        let Some(captures) = self.pattern.regex.captures_at(self.input, self.next_pos) else {
            self.captures = None;
            self.next_pos = self.input.len() + 1;
            return false;
        };

        let (start, end) = captures
            .get(0)
            .map(|m| (m.start(), m.end()))
            .unwrap_or((self.next_pos, self.next_pos));
        self.next_pos = if start == end {
            self.input[end..]
                .chars()
                .next()
                .map_or(end + 1, |c| end + c.len_utf8())
        } else {
            end
        };
        self.captures = Some(captures);
        true
    }

    /// Resets and searches from `start`.
    pub fn find_from(&mut self, start: usize) -> bool {
        self.reset();
        self.next_pos = start;
        self.find()
    }

    /// Whether the whole input matches.
    pub fn matches(&mut self) -> bool {
        self.captures = self.pattern.anchored.captures(self.input);
        self.next_pos = self.input.len() + 1;
        self.captures.is_some()
    }

    /// Text of the current overall match.
    pub fn as_str(&self) -> Option<&'t str> {
        self.group_at(0)
    }

    pub fn match_start(&self) -> Option<usize> {
        self.captures.as_ref().and_then(|c| c.get(0)).map(|m| m.start())
    }

    pub fn match_end(&self) -> Option<usize> {
        self.captures.as_ref().and_then(|c| c.get(0)).map(|m| m.end())
    }

    /// Text captured by the 1-based group `index`.
    pub fn group_at(&self, index: usize) -> Option<&'t str> {
        self.captures
            .as_ref()
            .and_then(|c| c.get(index))
            .map(|m| m.as_str())
    }

    /// Text captured by the group declared as `name`.
    ///
    /// # Panics
    ///
    /// Panics when `name` is not declared in the pattern. That is a bug in
    /// the pattern's caller, not a property of the input.
    pub fn group(&self, name: &str) -> Option<&'t str> {
        match self.try_group(name) {
            Ok(text) => text,
            Err(_) => panic!("no group named \"{name}\" in pattern {}", self.pattern),
        }
    }

    pub fn try_group(&self, name: &str) -> Result<Option<&'t str>> {
        let index = self
            .group_index(name)
            .ok_or_else(|| SearchError::UnknownGroup(name.to_string()))?;
        Ok(self.group_at(index))
    }

    pub fn start(&self, name: &str) -> Option<usize> {
        let index = self.group_index(name)?;
        self.captures
            .as_ref()
            .and_then(|c| c.get(index))
            .map(|m| m.start())
    }

    pub fn end(&self, name: &str) -> Option<usize> {
        let index = self.group_index(name)?;
        self.captures
            .as_ref()
            .and_then(|c| c.get(index))
            .map(|m| m.end())
    }

    pub fn group_count(&self) -> usize {
        self.pattern.regex.captures_len().saturating_sub(1)
    }

    pub fn ordered_groups(&self) -> Vec<Option<&'t str>> {
        (1..=self.group_count()).map(|i| self.group_at(i)).collect()
    }

    /// Matches afresh from position 0 and maps every declared name to its text.
    ///
    /// Returns an empty list when the pattern does not match at all.
    pub fn named_groups(&self) -> Vec<(&'p str, Option<&'t str>)> {
        let Some(captures) = self.pattern.regex.captures(self.input) else {
            return Vec::new();
        };
        self.pattern
            .group_names
            .iter()
            .map(|name| {
                let text = self
                    .group_index(name)
                    .and_then(|i| captures.get(i))
                    .map(|m| m.as_str());
                (name.as_str(), text)
            })
            .collect()
    }

    // 1-based index in the backing engine
    fn group_index(&self, name: &str) -> Option<usize> {
        self.pattern.index_of(name).map(|i| i + 1)
    }
}

/// Scans `named_pattern` and returns name -> occurrences, in declaration order.
pub fn extract_group_info(named_pattern: &str) -> Vec<(String, Vec<GroupInfo>)> {
    let mut out: Vec<(String, Vec<GroupInfo>)> = Vec::new();
    for opening in scan_named_openings(named_pattern) {
        match out.iter_mut().find(|(name, _)| *name == opening.name) {
            Some((_, list)) => list.push(opening.info),
            None => out.push((opening.name, vec![opening.info])),
        }
    }
    out
}

fn build_regex(pattern: &str, flags: PatternFlags) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.case_insensitive)
        .dot_matches_new_line(flags.dot_matches_new_line)
        .multi_line(flags.multi_line)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
}

fn scan_named_openings(pattern: &str) -> Vec<NamedOpening> {
    let s = pattern.as_bytes();
    let mut openings = Vec::new();

    for pos in memchr::memchr_iter(b'(', s) {
        let name_start = match (s.get(pos + 1), s.get(pos + 2), s.get(pos + 3)) {
            (Some(b'?'), Some(b'<'), _) => pos + 3,
            (Some(b'?'), Some(b'P'), Some(b'<')) => pos + 4,
            _ => continue,
        };
        // lookbehind, not a name
        if matches!(s.get(name_start), None | Some(b'=') | Some(b'!')) {
            continue;
        }
        let Some(close) = memchr::memchr(b'>', &s[name_start..]) else {
            continue;
        };
        if close == 0 || is_escaped(s, pos) || is_inside_char_class(s, pos) {
            continue;
        }

        let end = name_start + close + 1;
        openings.push(NamedOpening {
            name: pattern[name_start..end - 1].to_string(),
            info: GroupInfo {
                group_index: count_open_parens(s, pos),
                position: pos,
            },
            end,
        });
    }
    openings
}

/// Replaces named openings with plain `(` and `\Q...\E` spans with their
/// escaped contents, which the backing engine has no syntax for.
fn rewrite_openings(pattern: &str, openings: &[NamedOpening]) -> String {
    let mut edits: Vec<(usize, usize, String)> = openings
        .iter()
        .map(|o| (o.info.position, o.end, "(".to_string()))
        .chain(
            quoted_spans(pattern.as_bytes())
                .into_iter()
                .map(|q| (q.start, q.end, regex::escape(&pattern[q.inner_start..q.inner_end]))),
        )
        .collect();
    edits.sort_by_key(|&(start, _, _)| start);

    let mut out = String::with_capacity(pattern.len());
    let mut copied = 0;
    for (start, end, replacement) in edits {
        if start < copied {
            continue;
        }
        out.push_str(&pattern[copied..start]);
        out.push_str(&replacement);
        copied = end;
    }
    out.push_str(&pattern[copied..]);
    out
}

struct QuotedSpan {
    start: usize,
    inner_start: usize,
    inner_end: usize,
    end: usize,
}

// an unterminated span runs to the end of the pattern
fn quoted_spans(s: &[u8]) -> Vec<QuotedSpan> {
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some(offset) = memchr::memmem::find(&s[from..], b"\\Q") {
        let start = from + offset;
        if is_slash_escaped(s, start) {
            from = start + 2;
            continue;
        }
        let inner_start = start + 2;
        let (inner_end, end) = match memchr::memmem::find(&s[inner_start..], b"\\E") {
            Some(close) => (inner_start + close, inner_start + close + 2),
            None => (s.len(), s.len()),
        };
        spans.push(QuotedSpan {
            start,
            inner_start,
            inner_end,
            end,
        });
        from = end;
    }
    spans
}

fn count_open_parens(s: &[u8], pos: usize) -> usize {
    memchr::memchr_iter(b'(', &s[..pos])
        .filter(|&p| !is_inside_char_class(s, p) && !is_escaped(s, p) && !is_noncapturing_paren(s, p))
        .count()
}

fn is_noncapturing_paren(s: &[u8], pos: usize) -> bool {
    if s.get(pos + 1) != Some(&b'?') {
        return false;
    }
    match s.get(pos + 2) {
        Some(b'<') => matches!(s.get(pos + 3), Some(b'=') | Some(b'!')),
        Some(b'P') => s.get(pos + 3) != Some(&b'<'),
        _ => true,
    }
}

fn is_escaped(s: &[u8], pos: usize) -> bool {
    is_slash_escaped(s, pos) || is_quote_escaped(s, pos)
}

fn is_slash_escaped(s: &[u8], pos: usize) -> bool {
    let slashes = s[..pos].iter().rev().take_while(|&&b| b == b'\\').count();
    slashes % 2 != 0
}

// inside an unterminated \Q...\E literal
fn is_quote_escaped(s: &[u8], pos: usize) -> bool {
    let head = &s[..pos];
    let mut limit = head.len();
    while let Some(open) = memchr::memmem::rfind(&head[..limit], b"\\Q") {
        if !is_slash_escaped(head, open) {
            return memchr::memmem::find(&head[open + 2..], b"\\E").is_none();
        }
        limit = open;
    }
    false
}

fn is_inside_char_class(s: &[u8], pos: usize) -> bool {
    let head = &s[..pos];
    let mut limit = head.len();
    let open = loop {
        match memchr::memrchr(b'[', &head[..limit]) {
            Some(p) if is_escaped(head, p) => limit = p,
            other => break other,
        }
    };
    let Some(open) = open else {
        return false;
    };

    let mut i = open + 1;
    if head.get(i) == Some(&b'^') {
        i += 1;
    }
    // a leading ']' is a literal member
    if head.get(i) == Some(&b']') {
        i += 1;
    }
    while i < head.len() {
        let Some(offset) = memchr::memchr(b']', &head[i..]) else {
            break;
        };
        let close = i + offset;
        if !is_escaped(head, close) {
            return false;
        }
        i = close + 1;
    }
    true
}
