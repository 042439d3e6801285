//! Regex-based listing extraction with an optional fallback layout.
use super::html::{is_blank, is_valid_html_with, MarkerBounds};
use super::pattern::SearchPattern;
use super::StopSignal;
use crate::error::{Result, SearchError};
use crate::named_regex::{Matcher, Pattern};
use crate::result::SearchResult;
use log::{debug, info, warn};

pub const DEFAULT_MAX_RESULTS: usize = 100;

pub type UrlBuilder = dyn Fn(&str, u32) -> String + Send + Sync;
pub type ResultMapper = dyn Fn(&Matcher<'_, '_>) -> Result<SearchResult> + Send + Sync;

/// Which pattern produced a page's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternVariant {
    Primary,
    Fallback,
    NoMatch,
}

#[derive(Debug)]
pub struct RegexParse {
    pub results: Vec<SearchResult>,
    pub variant: PatternVariant,
}

/// Runs `primary` over `html`, switching to `fallback` for the whole input
/// when the primary never matches. Items the mapper rejects are skipped.
pub(crate) fn extract<'p, T>(
    source_name: &str,
    primary: &'p Pattern,
    fallback: Option<&'p Pattern>,
    html: &str,
    max_results: usize,
    stop: &StopSignal,
    map: impl Fn(&Matcher<'_, '_>) -> Result<T>,
) -> (Vec<T>, PatternVariant) {
    let mut matcher = primary.matcher(html);
    let mut variant = PatternVariant::Primary;
    let mut found = matcher.find();

    if !found {
        if let Some(fallback) = fallback {
            info!(
                "{}: primary pattern found nothing, switching to fallback pattern",
                source_name
            );
            matcher = fallback.matcher(html);
            variant = PatternVariant::Fallback;
            found = matcher.find();
        }
    }
    if !found {
        debug!("{}: no pattern matched the page", source_name);
        return (Vec::new(), PatternVariant::NoMatch);
    }

    let mut items = Vec::new();
    while found && !stop.is_stopped() && items.len() < max_results {
        match map(&matcher) {
            Ok(item) => items.push(item),
            Err(e) => warn!("{}: skipping unparsable item: {}", source_name, e),
        }
        found = matcher.find();
    }
    (items, variant)
}

/// A [`SearchPattern`] that scrapes listing rows with a named-group regex.
pub struct RegexSearchPattern {
    name: String,
    url_builder: Box<UrlBuilder>,
    primary: Pattern,
    fallback: Option<Pattern>,
    bounds: MarkerBounds,
    max_results: usize,
    blocked_markers: Vec<String>,
    mapper: Box<ResultMapper>,
}

impl RegexSearchPattern {
    pub fn new(
        name: impl Into<String>,
        url_builder: impl Fn(&str, u32) -> String + Send + Sync + 'static,
        primary: Pattern,
        mapper: impl Fn(&Matcher<'_, '_>) -> Result<SearchResult> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            url_builder: Box::new(url_builder),
            primary,
            fallback: None,
            bounds: MarkerBounds::default(),
            max_results: DEFAULT_MAX_RESULTS,
            blocked_markers: Vec::new(),
            mapper: Box::new(mapper),
        }
    }

    pub fn with_fallback(mut self, fallback: Pattern) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_bounds(mut self, bounds: MarkerBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    /// Page content that marks a response as blocked for this source.
    pub fn with_blocked_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parses a page and reports which pattern produced the results.
    pub fn parse_page(&self, body: &str, stop: &StopSignal) -> Result<RegexParse> {
        if is_blank(body) {
            debug!("{}: empty page", self.name);
            return Ok(RegexParse {
                results: Vec::new(),
                variant: PatternVariant::NoMatch,
            });
        }
        let markers: Vec<&str> = self.blocked_markers.iter().map(String::as_str).collect();
        if !is_valid_html_with(body, &markers) {
            return Err(SearchError::Blocked {
                source_name: self.name.clone(),
            });
        }
        let Some(html) = self.bounds.reduce(body) else {
            debug!("{}: listing bounds not found in page", self.name);
            return Ok(RegexParse {
                results: Vec::new(),
                variant: PatternVariant::NoMatch,
            });
        };

        let (results, variant) = extract(
            &self.name,
            &self.primary,
            self.fallback.as_ref(),
            html,
            self.max_results,
            stop,
            |m| (self.mapper)(m),
        );
        Ok(RegexParse { results, variant })
    }
}

impl SearchPattern for RegexSearchPattern {
    fn search_url(&self, encoded_keywords: &str, page: u32) -> String {
        (self.url_builder)(encoded_keywords, page)
    }

    fn parse_results(&self, body: &str, stop: &StopSignal) -> Result<Vec<SearchResult>> {
        self.parse_page(body, stop).map(|parse| parse.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    const FIXTURE: &str = r#"<html><body>
        <ul class="listing">
          <li><a href="/d/1">First Song</a> <span>4 MB</span></li>
          <li><a href="/d/2">Second Song</a> <span>6 MB</span></li>
        </ul></body></html>"#;

    fn pattern(primary: &str, fallback: Option<&str>) -> RegexSearchPattern {
        let p = RegexSearchPattern::new(
            "fixture",
            |kw, page| format!("https://example.org/search/{kw}/{page}"),
            Pattern::compile(primary).unwrap(),
            |m| {
                let name = m.group("name").unwrap_or_default();
                SearchResult::builder()
                    .display_name(name)
                    .source("fixture")
                    .details_url(format!("https://example.org{}", m.group("url").unwrap_or("")))
                    .file(format!("{name}.mp3"), crate::size::parse_size(m.group("size").unwrap_or("")))
                    .build()
            },
        );
        match fallback {
            Some(f) => p.with_fallback(Pattern::compile(f).unwrap()),
            None => p,
        }
    }

    #[test]
    fn test_fallback_pattern_is_used_and_logged() {
        testing_logger::setup();
        let p = pattern(
            r#"<tr class="row"><td><a href="(?<url>[^"]+)">(?<name>[^<]+)</a></td><td>(?<size>[^<]+)</td>"#,
            Some(r#"<li><a href="(?<url>[^"]+)">(?<name>[^<]+)</a> <span>(?<size>[^<]+)</span>"#),
        );
        let parse = p.parse_page(FIXTURE, &StopSignal::new()).unwrap();
        assert_eq!(parse.variant, PatternVariant::Fallback);
        assert_eq!(parse.results.len(), 2);
        assert_eq!(parse.results[1].display_name(), "Second Song");
        assert_eq!(parse.results[0].size(), Some(4 * 1024 * 1024));
        assert_eq!(parse.results[0].details_url(), "https://example.org/d/1");

        testing_logger::validate(|logs| {
            assert!(logs
                .iter()
                .any(|l| l.level == Level::Info && l.body.contains("fallback")));
        });
    }

    #[test]
    fn test_primary_pattern_wins_when_it_matches() {
        let p = pattern(
            r#"<li><a href="(?<url>[^"]+)">(?<name>[^<]+)</a> <span>(?<size>[^<]+)</span>"#,
            Some(r#"(?<name>never)(?<url>x)(?<size>y)"#),
        );
        let parse = p.parse_page(FIXTURE, &StopSignal::new()).unwrap();
        assert_eq!(parse.variant, PatternVariant::Primary);
        assert_eq!(parse.results.len(), 2);
    }

    #[test]
    fn test_max_results_caps_page() {
        let p = pattern(
            r#"<li><a href="(?<url>[^"]+)">(?<name>[^<]+)</a> <span>(?<size>[^<]+)</span>"#,
            None,
        )
        .with_max_results(1);
        assert_eq!(p.parse_results(FIXTURE, &StopSignal::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_blocked_page_is_reported() {
        let p = pattern(r"(?<name>x)(?<url>y)(?<size>z)", None).with_blocked_markers(["Cloudflare"]);
        let err = p
            .parse_results("<html>Cloudflare Ray ID</html>", &StopSignal::new())
            .unwrap_err();
        assert!(err.is_blocked());
    }

    #[test]
    fn test_empty_page_is_not_blocked() {
        let p = pattern(r"(?<name>x)(?<url>y)(?<size>z)", None).with_blocked_markers(["Cloudflare"]);
        let parse = p.parse_page("  \n", &StopSignal::new()).unwrap();
        assert!(parse.results.is_empty());
        assert_eq!(parse.variant, PatternVariant::NoMatch);
    }

    #[test]
    fn test_missing_bounds_yield_nothing() {
        let p = pattern(
            r#"<li><a href="(?<url>[^"]+)">(?<name>[^<]+)</a> <span>(?<size>[^<]+)</span>"#,
            None,
        )
        .with_bounds(MarkerBounds::new("<table", "</table>"));
        let parse = p.parse_page(FIXTURE, &StopSignal::new()).unwrap();
        assert!(parse.results.is_empty());
        assert_eq!(parse.variant, PatternVariant::NoMatch);
    }

    #[test]
    fn test_stopped_parse_returns_early() {
        let p = pattern(
            r#"<li><a href="(?<url>[^"]+)">(?<name>[^<]+)</a> <span>(?<size>[^<]+)</span>"#,
            None,
        );
        let stop = StopSignal::new();
        stop.stop();
        assert!(p.parse_results(FIXTURE, &stop).unwrap().is_empty());
    }

    #[test]
    fn test_search_url() {
        let p = pattern(r"(?<name>x)(?<url>y)(?<size>z)", None);
        assert_eq!(p.search_url("a%20b", 2), "https://example.org/search/a%20b/2");
    }
}
