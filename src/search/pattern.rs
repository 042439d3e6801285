//! The per-source search strategy.
use super::StopSignal;
use crate::error::Result;
use crate::http::HttpMethod;
use crate::result::SearchResult;

/// Builds a source's query URL and turns one response page into results.
///
/// Implementations are stateless and shared between concurrent queries.
pub trait SearchPattern: Send + Sync {
    /// URL of result page `page` (1-based) for already encoded keywords.
    fn search_url(&self, encoded_keywords: &str, page: u32) -> String;

    /// Parses one page. A blocked response is reported as
    /// [`SearchError::Blocked`](crate::error::SearchError::Blocked).
    fn parse_results(&self, body: &str, stop: &StopSignal) -> Result<Vec<SearchResult>>;

    fn http_method(&self) -> HttpMethod {
        HttpMethod::Get
    }

    fn request_body(&self, _encoded_keywords: &str, _page: u32) -> Option<String> {
        None
    }

    fn custom_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}
