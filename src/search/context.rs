//! Collaborators shared by every performer and manager of an engine.
use super::cache::CrawlCache;
use super::torrent::MagnetResolver;
use crate::http::{HttpClient, DEFAULT_USER_AGENT};
use crate::metrics::Metrics;
use std::sync::Arc;
use std::time::Duration;

/// Built once at startup and passed by `Arc` to everything that needs it.
#[derive(Clone)]
pub struct SearchContext {
    pub http: Arc<dyn HttpClient>,
    pub cache: Option<Arc<CrawlCache>>,
    pub metrics: Arc<Metrics>,
    pub magnet_resolver: Option<Arc<dyn MagnetResolver>>,
    pub user_agent: String,
    /// Search page requests.
    pub timeout: Duration,
    /// Crawl downloads.
    pub crawl_timeout: Duration,
    pub magnet_timeout: Duration,
}

impl SearchContext {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            cache: Some(Arc::new(CrawlCache::default())),
            metrics: Arc::new(Metrics::new()),
            magnet_resolver: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(5),
            crawl_timeout: Duration::from_secs(10),
            magnet_timeout: Duration::from_secs(20),
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<CrawlCache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_magnet_resolver(mut self, resolver: Arc<dyn MagnetResolver>) -> Self {
        self.magnet_resolver = Some(resolver);
        self
    }

    pub fn with_timeouts(mut self, timeout: Duration, crawl: Duration, magnet: Duration) -> Self {
        self.timeout = timeout;
        self.crawl_timeout = crawl;
        self.magnet_timeout = magnet;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
