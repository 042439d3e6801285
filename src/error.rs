use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request to {url} timed out after {timeout_ms} ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Request to {url} failed with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Blocked response from {source_name} (anti-bot challenge page)")]
    Blocked { source_name: String },

    #[error("Failed to parse response from {source_name}: {reason}")]
    Parse { source_name: String, reason: String },

    #[error("Invalid search result: {0}")]
    InvalidResult(String),

    #[error("No group named \"{0}\"")]
    UnknownGroup(String),

    #[error("Unsupported crawl URL: {0}")]
    UnsupportedUrl(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("An unexpected error occurred: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl SearchError {
    pub fn parse(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        SearchError::Parse {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Timeouts, non-2xx statuses and connection failures.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SearchError::Timeout { .. }
                | SearchError::HttpStatus { .. }
                | SearchError::Transport { .. }
                | SearchError::Io(_)
        )
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, SearchError::Blocked { .. })
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
