//! The single performer type: paging, parsing and the crawl pipeline.
use super::context::SearchContext;
use super::crawl::CrawlingStrategy;
use super::pattern::SearchPattern;
use super::{SearchListener, SourceCategory, StopSignal};
use crate::error::{Result, SearchError};
use crate::http::{encode_keywords, HttpRequest};
use crate::result::SearchResult;
use crate::token::SearchToken;
use log::{debug, info, warn};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerformerConfig {
    pub max_pages: u32,
    /// Crawls allowed per query across all pages.
    pub num_crawls: usize,
}

impl Default for PerformerConfig {
    fn default() -> Self {
        Self {
            max_pages: 1,
            num_crawls: 10,
        }
    }
}

/// Runs one source for one query: pages `1..=max_pages`, then crawls the
/// preliminary results of each page before moving on.
pub struct SearchPerformer {
    token: SearchToken,
    source: String,
    category: SourceCategory,
    keywords: String,
    encoded_keywords: String,
    pattern: Arc<dyn SearchPattern>,
    crawler: Option<Arc<dyn CrawlingStrategy>>,
    context: Arc<SearchContext>,
    config: PerformerConfig,
    stop: StopSignal,
}

impl SearchPerformer {
    pub fn new(
        token: SearchToken,
        source: impl Into<String>,
        category: SourceCategory,
        keywords: &str,
        pattern: Arc<dyn SearchPattern>,
        context: Arc<SearchContext>,
    ) -> Self {
        Self {
            token,
            source: source.into(),
            category,
            keywords: keywords.to_string(),
            encoded_keywords: encode_keywords(keywords),
            pattern,
            crawler: None,
            context,
            config: PerformerConfig::default(),
            stop: StopSignal::new(),
        }
    }

    pub fn with_crawler(mut self, crawler: Arc<dyn CrawlingStrategy>) -> Self {
        self.crawler = Some(crawler);
        self
    }

    pub fn with_config(mut self, config: PerformerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn token(&self) -> SearchToken {
        self.token
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn category(&self) -> SourceCategory {
        self.category
    }

    pub fn keywords(&self) -> &str {
        &self.keywords
    }

    pub fn config(&self) -> PerformerConfig {
        self.config
    }

    /// Returns true the first time.
    pub fn stop(&self) -> bool {
        self.stop.stop()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn perform(&self, listener: &dyn SearchListener) {
        let mut crawl_budget = self.config.num_crawls;

        for page in 1..=self.config.max_pages.max(1) {
            if self.is_stopped() {
                debug!("{}: stopped before page {}", self.source, page);
                break;
            }

            let body = match self.fetch_page(page) {
                Ok(body) => body,
                Err(e) => {
                    if e.is_transport() {
                        self.context.metrics.transport_errors.inc();
                    }
                    warn!("{}: page {} failed: {}", self.source, page, e);
                    if !self.is_stopped() {
                        listener.on_error(self.token, &e);
                    }
                    break;
                }
            };

            let results = match self.pattern.parse_results(&body, &self.stop) {
                Ok(results) => results,
                Err(e) if e.is_blocked() => {
                    self.context.metrics.blocked_responses.inc();
                    warn!("{}: page {} is an anti-bot challenge, ignoring it", self.source, page);
                    Vec::new()
                }
                Err(e) => {
                    warn!("{}: could not parse page {}: {}", self.source, page, e);
                    Vec::new()
                }
            };
            if results.is_empty() {
                debug!("{}: page {} has no results, done paging", self.source, page);
                break;
            }

            let (preliminary, complete): (Vec<_>, Vec<_>) = results
                .into_iter()
                .map(Arc::new)
                .partition(|r| r.is_preliminary());
            debug!(
                "{}: page {} gave {} complete and {} preliminary results",
                self.source,
                page,
                complete.len(),
                preliminary.len()
            );
            self.emit(listener, complete);

            if self.crawler.is_some() && !preliminary.is_empty() {
                let take = preliminary.len().min(crawl_budget);
                crawl_budget -= take;
                if take < preliminary.len() {
                    debug!(
                        "{}: crawl budget exhausted, dropping {} preliminary results",
                        self.source,
                        preliminary.len() - take
                    );
                }
                self.crawl_results(preliminary.into_iter().take(take).collect(), listener);
            }
        }
    }

    /// Expands `preliminary` one after the other, emitting each crawl's
    /// results as soon as they are known.
    pub fn crawl_results(&self, preliminary: Vec<Arc<SearchResult>>, listener: &dyn SearchListener) {
        let Some(crawler) = &self.crawler else {
            return;
        };
        for parent in preliminary {
            if self.is_stopped() {
                break;
            }
            let results = self.crawl_one(crawler.as_ref(), &parent);
            self.emit(listener, results.into_iter().map(Arc::new).collect());
        }
    }

    fn crawl_one(&self, crawler: &dyn CrawlingStrategy, parent: &Arc<SearchResult>) -> Vec<SearchResult> {
        self.context.metrics.crawls_performed.inc();
        let cache = self.context.cache.as_deref();

        let data = match crawler.crawl_url(parent) {
            None => None,
            Some(url) if cache.is_some_and(|c| c.recently_failed(&url)) => {
                info!("{}: {} failed recently, not crawling it again", self.source, url);
                None
            }
            Some(url) => {
                let hash = parent
                    .info_hash()
                    .filter(|h| !h.is_empty())
                    .map(str::to_string);
                let cached = cache.and_then(|c| {
                    c.get(&url)
                        .or_else(|| hash.as_deref().and_then(|h| c.get(h)))
                });
                let data = match cached {
                    Some(data) => {
                        debug!("{}: crawl cache hit for {}", self.source, url);
                        Some(data)
                    }
                    None => self.download(&url, parent).map(Arc::new),
                };
                if let (Some(cache), Some(data)) = (cache, &data) {
                    cache.put(url.clone(), Arc::clone(data));
                    if let Some(hash) = &hash {
                        cache.put(hash.clone(), Arc::clone(data));
                    }
                }

                let bytes = data.as_deref().map(Vec::as_slice);
                match crawler.crawl_result(parent, bytes, &self.stop) {
                    Ok(results) => return results,
                    Err(e) => {
                        self.context.metrics.crawl_failures.inc();
                        if e.is_blocked() {
                            self.context.metrics.blocked_responses.inc();
                        }
                        warn!("{}: could not expand {}: {}", self.source, url, e);
                        if let Some(cache) = cache {
                            cache.remove(&url);
                            if let Some(hash) = &hash {
                                cache.remove(hash);
                            }
                        }
                        return Vec::new();
                    }
                }
            }
        };

        crawler.crawl_result(parent, data, &self.stop).unwrap_or_else(|e| {
            warn!("{}: could not expand {}: {}", self.source, parent.display_name(), e);
            Vec::new()
        })
    }

    // None when there is nothing to fetch or the fetch failed
    fn download(&self, url: &str, parent: &SearchResult) -> Option<Vec<u8>> {
        match self.fetch_crawl_target(url, parent) {
            Ok(data) => data,
            Err(e) => {
                self.context.metrics.crawl_failures.inc();
                if e.is_transport() {
                    self.context.metrics.transport_errors.inc();
                }
                warn!("{}: crawl download of {} failed: {}", self.source, url, e);
                if let Some(cache) = &self.context.cache {
                    cache.mark_failed(url);
                }
                None
            }
        }
    }

    fn fetch_crawl_target(&self, url: &str, parent: &SearchResult) -> Result<Option<Vec<u8>>> {
        if url.starts_with("magnet:") {
            let Some(resolver) = &self.context.magnet_resolver else {
                debug!("{}: no magnet resolver, skipping {}", self.source, url);
                return Ok(None);
            };
            return resolver.resolve(url, self.context.magnet_timeout).map(Some);
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            let mut request = HttpRequest::get(url, self.context.crawl_timeout)
                .with_user_agent(self.context.user_agent.as_str());
            if !parent.details_url().is_empty() {
                request = request.with_referrer(parent.details_url());
            }
            return self.context.http.fetch(&request).map(Some);
        }
        Err(SearchError::UnsupportedUrl(url.to_string()))
    }

    fn fetch_page(&self, page: u32) -> Result<String> {
        let url = self.pattern.search_url(&self.encoded_keywords, page);
        debug!("{}: fetching page {} from {}", self.source, page, url);
        let request = HttpRequest::get(url, self.context.timeout)
            .with_user_agent(self.context.user_agent.as_str())
            .with_method(
                self.pattern.http_method(),
                self.pattern.request_body(&self.encoded_keywords, page),
            )
            .with_headers(self.pattern.custom_headers());
        let bytes = self.context.http.fetch(&request)?;
        self.context.metrics.pages_fetched.inc();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn emit(&self, listener: &dyn SearchListener, results: Vec<Arc<SearchResult>>) {
        if results.is_empty() || self.is_stopped() {
            return;
        }
        self.context
            .metrics
            .results_emitted
            .inc_by(results.len() as u64);
        listener.on_results(self.token, results);
    }
}
