//! Second-phase expansion of preliminary results.
use super::html::{is_blank, is_valid_html_with, MarkerBounds};
use super::regex_pattern::{extract, DEFAULT_MAX_RESULTS};
use super::StopSignal;
use crate::error::{Result, SearchError};
use crate::named_regex::{Matcher, Pattern};
use crate::result::SearchResult;
use log::debug;
use std::sync::Arc;

/// Expands one preliminary result from the bytes behind its crawl URL.
pub trait CrawlingStrategy: Send + Sync {
    /// URL to download for `result`, or `None` to skip it.
    fn crawl_url(&self, result: &SearchResult) -> Option<String> {
        result.crawl_url().map(str::to_string)
    }

    /// `data` is `None` when nothing could be downloaded. Implementations
    /// stop expanding once `stop` is set.
    fn crawl_result(
        &self,
        parent: &Arc<SearchResult>,
        data: Option<&[u8]>,
        stop: &StopSignal,
    ) -> Result<Vec<SearchResult>>;
}

type DetailsMapper = dyn Fn(&Arc<SearchResult>, &Matcher<'_, '_>) -> Result<SearchResult> + Send + Sync;

/// Matches a details page with the same primary/fallback and reduction
/// rules as listing pages.
pub struct RegexDetailsCrawler {
    name: String,
    primary: Pattern,
    fallback: Option<Pattern>,
    bounds: MarkerBounds,
    max_results: usize,
    blocked_markers: Vec<String>,
    mapper: Box<DetailsMapper>,
}

impl RegexDetailsCrawler {
    pub fn new(
        name: impl Into<String>,
        primary: Pattern,
        mapper: impl Fn(&Arc<SearchResult>, &Matcher<'_, '_>) -> Result<SearchResult>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
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

    pub fn with_blocked_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_markers = markers.into_iter().map(Into::into).collect();
        self
    }
}

impl CrawlingStrategy for RegexDetailsCrawler {
    fn crawl_result(
        &self,
        parent: &Arc<SearchResult>,
        data: Option<&[u8]>,
        stop: &StopSignal,
    ) -> Result<Vec<SearchResult>> {
        let Some(data) = data else {
            return Ok(Vec::new());
        };
        let page = String::from_utf8_lossy(data);
        if is_blank(&page) {
            return Ok(Vec::new());
        }
        let markers: Vec<&str> = self.blocked_markers.iter().map(String::as_str).collect();
        if !is_valid_html_with(&page, &markers) {
            return Err(SearchError::Blocked {
                source_name: self.name.clone(),
            });
        }
        let Some(html) = self.bounds.reduce(&page) else {
            debug!("{}: details bounds not found for {}", self.name, parent.display_name());
            return Ok(Vec::new());
        };

        let (results, _) = extract(
            &self.name,
            &self.primary,
            self.fallback.as_ref(),
            html,
            self.max_results,
            stop,
            |m| (self.mapper)(parent, m),
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> Arc<SearchResult> {
        Arc::new(
            SearchResult::builder()
                .display_name("Some Album")
                .source("fixture")
                .details_url("https://example.org/torrent/7/some-album/")
                .preliminary(true)
                .crawlable()
                .build()
                .unwrap(),
        )
    }

    fn crawler() -> RegexDetailsCrawler {
        RegexDetailsCrawler::new(
            "fixture",
            Pattern::compile(r#"href="(?<magnet>magnet:[^"]+)".*?Seeders: (?<seeds>\d+)"#).unwrap(),
            |parent, m| {
                let magnet = m.group("magnet").unwrap_or_default();
                SearchResult::crawled_from(parent)
                    .display_name(parent.display_name())
                    .file(format!("{}.torrent", parent.display_name()), 2048)
                    .torrent(
                        magnet,
                        crate::search::html::parse_info_hash(magnet).unwrap_or_default(),
                        crate::search::html::parse_count(m.group("seeds").unwrap_or("0")),
                        parent.details_url(),
                    )
                    .build()
            },
        )
    }

    #[test]
    fn test_details_page_expands_to_torrent() {
        let page = br#"<a href="magnet:?xt=urn:btih:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa">Magnet</a> Seeders: 42"#;
        let results = crawler()
            .crawl_result(&parent(), Some(page), &StopSignal::new())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].seeds(), Some(42));
        assert_eq!(results[0].info_hash(), Some("a".repeat(40).as_str()));
        assert!(results[0].is_crawled());
        assert!(!results[0].is_preliminary());
    }

    #[test]
    fn test_missing_data_yields_nothing() {
        assert!(crawler()
            .crawl_result(&parent(), None, &StopSignal::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_stopped_crawl_expands_nothing() {
        let page = br#"<a href="magnet:?xt=urn:btih:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa">Magnet</a> Seeders: 42"#;
        let stop = StopSignal::new();
        stop.stop();
        assert!(crawler()
            .crawl_result(&parent(), Some(page), &stop)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_default_crawl_url_is_details() {
        let p = parent();
        assert_eq!(
            crawler().crawl_url(&p).as_deref(),
            Some("https://example.org/torrent/7/some-album/")
        );
    }
}
