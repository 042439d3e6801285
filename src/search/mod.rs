//! Per-source search strategies and the machinery that runs them.
pub mod cache;
pub mod context;
pub mod crawl;
pub mod html;
pub mod json_pattern;
pub mod manager;
pub mod pattern;
pub mod performer;
pub mod regex_pattern;
pub mod torrent;

use crate::error::SearchError;
use crate::result::SearchResult;
use crate::token::SearchToken;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use cache::CrawlCache;
pub use context::SearchContext;
pub use crawl::{CrawlingStrategy, RegexDetailsCrawler};
pub use json_pattern::JsonSearchPattern;
pub use manager::SearchManager;
pub use pattern::SearchPattern;
pub use performer::{PerformerConfig, SearchPerformer};
pub use regex_pattern::RegexSearchPattern;

/// Groups of sources that get their own worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SourceCategory {
    Cloud,
    TorrentIndex,
}

impl SourceCategory {
    pub const ALL: [SourceCategory; 2] = [SourceCategory::Cloud, SourceCategory::TorrentIndex];
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceCategory::Cloud => write!(f, "cloud"),
            SourceCategory::TorrentIndex => write!(f, "torrent-index"),
        }
    }
}

/// Cooperative cancellation flag shared between a performer and its manager.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives what one performer produces.
pub trait SearchListener: Send + Sync {
    fn on_results(&self, token: SearchToken, results: Vec<Arc<SearchResult>>);
    fn on_error(&self, token: SearchToken, error: &SearchError);
    fn on_stopped(&self, token: SearchToken);
}

/// Events relayed by a [`SearchManager`] over its channel.
#[derive(Debug, Clone)]
pub enum SearchEvent {
    Results {
        token: SearchToken,
        source: String,
        results: Vec<Arc<SearchResult>>,
    },
    Error {
        token: SearchToken,
        source: String,
        message: String,
    },
    Stopped {
        token: SearchToken,
        source: String,
    },
    /// Every performer of `token` in `category` has terminated.
    Finished {
        token: SearchToken,
        category: SourceCategory,
    },
}

impl SearchEvent {
    pub fn token(&self) -> SearchToken {
        match self {
            SearchEvent::Results { token, .. }
            | SearchEvent::Error { token, .. }
            | SearchEvent::Stopped { token, .. }
            | SearchEvent::Finished { token, .. } => *token,
        }
    }
}
