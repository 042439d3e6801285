pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod keywords;
pub mod metrics;
pub mod named_regex;
pub mod result;
pub mod search;
pub mod size;
pub mod sources;
pub mod token;

pub use crate::config::Config;
pub use crate::engine::{EngineConfig, EngineEvent, LocalSearchEngine};
pub use crate::error::{Result, SearchError};
pub use crate::keywords::{accept, normalize, tokenize, KeywordFilter};
pub use crate::named_regex::{Matcher, Pattern, PatternFlags};
pub use crate::result::{SearchResult, SearchResultBuilder};
pub use crate::search::{
    CrawlingStrategy, SearchContext, SearchManager, SearchPattern, SearchPerformer,
    SourceCategory,
};
pub use crate::sources::{builtin_sources, SourceDefinition};
pub use crate::token::{SearchToken, TokenMint};
pub use clap::Parser;
