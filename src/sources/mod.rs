//! Built-in source definitions.
//!
//! A source is a [`SearchPattern`] plus an optional [`CrawlingStrategy`];
//! the engine turns each enabled definition into one [`SearchPerformer`]
//! per query.
pub mod internet_archive;
pub mod one337x;
pub mod torrents_csv;
pub mod tpb;

use crate::search::{
    CrawlingStrategy, PerformerConfig, SearchContext, SearchPattern, SearchPerformer,
    SourceCategory,
};
use crate::token::SearchToken;
use std::fmt;
use std::sync::Arc;

pub struct SourceDefinition {
    pub name: String,
    pub category: SourceCategory,
    pub enabled: bool,
    pub pattern: Arc<dyn SearchPattern>,
    pub crawler: Option<Arc<dyn CrawlingStrategy>>,
    pub config: PerformerConfig,
}

impl SourceDefinition {
    pub fn new(
        name: impl Into<String>,
        category: SourceCategory,
        pattern: Arc<dyn SearchPattern>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            enabled: true,
            pattern,
            crawler: None,
            config: PerformerConfig::default(),
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

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// A fresh performer of this source for one query.
    pub fn performer(
        &self,
        token: SearchToken,
        keywords: &str,
        context: &Arc<SearchContext>,
    ) -> SearchPerformer {
        let performer = SearchPerformer::new(
            token,
            self.name.clone(),
            self.category,
            keywords,
            Arc::clone(&self.pattern),
            Arc::clone(context),
        )
        .with_config(self.config);
        match &self.crawler {
            Some(crawler) => performer.with_crawler(Arc::clone(crawler)),
            None => performer,
        }
    }
}

impl fmt::Debug for SourceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDefinition")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("enabled", &self.enabled)
            .field("crawls", &self.crawler.is_some())
            .field("config", &self.config)
            .finish()
    }
}

/// Every built-in source with its default settings.
pub fn builtin_sources() -> Vec<SourceDefinition> {
    vec![
        tpb::definition(tpb::DEFAULT_DOMAIN),
        torrents_csv::definition(),
        one337x::definition(one337x::DEFAULT_DOMAIN),
        internet_archive::definition(),
    ]
}
