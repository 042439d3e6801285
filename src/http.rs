//! HTTP collaborator used by performers and crawlers.
use crate::error::{Result, SearchError};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, REFERER, USER_AGENT};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    /// `application/x-www-form-urlencoded` body.
    PostForm,
    PostJson,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub method: HttpMethod,
    pub body: Option<String>,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            body: None,
            timeout,
            user_agent: None,
            referrer: None,
            headers: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: HttpMethod, body: Option<String>) -> Self {
        self.method = method;
        self.body = body;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

/// Blocking fetch of one URL. Non-2xx statuses are errors.
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    fn fetch(&self, request: &HttpRequest) -> Result<Vec<u8>>;
}

/// [`HttpClient`] backed by `reqwest`'s blocking client.
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| SearchError::Transport {
                url: String::new(),
                source: Box::new(e),
            })?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn fetch(&self, request: &HttpRequest) -> Result<Vec<u8>> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::PostForm => self
                .client
                .post(&request.url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded"),
            HttpMethod::PostJson => self
                .client
                .post(&request.url)
                .header(CONTENT_TYPE, "application/json"),
        };
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        builder = builder.timeout(request.timeout).header(
            USER_AGENT,
            request.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT),
        );
        if let Some(referrer) = &request.referrer {
            builder = builder.header(REFERER, referrer.as_str());
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().map_err(|e| transport_error(request, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::HttpStatus {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().map_err(|e| transport_error(request, e))?;
        Ok(bytes.to_vec())
    }
}

fn transport_error(request: &HttpRequest, err: reqwest::Error) -> SearchError {
    if err.is_timeout() {
        SearchError::Timeout {
            url: request.url.clone(),
            timeout_ms: request.timeout_ms(),
        }
    } else {
        SearchError::Transport {
            url: request.url.clone(),
            source: Box::new(err),
        }
    }
}

/// Percent-encodes keywords for a query string, spaces as `%20`.
pub fn encode_keywords(keywords: &str) -> String {
    url::form_urlencoded::byte_serialize(keywords.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Host part of `url`, without a leading `www.`.
pub fn domain(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_keywords() {
        assert_eq!(encode_keywords("creative commons"), "creative%20commons");
        assert_eq!(encode_keywords("a+b&c"), "a%2Bb%26c");
        assert_eq!(encode_keywords("café"), "caf%C3%A9");
    }

    #[test]
    fn test_domain() {
        assert_eq!(
            domain("https://www.example.org/path?q=1").as_deref(),
            Some("example.org")
        );
        assert_eq!(domain("not a url"), None);
    }

    #[test]
    fn test_request_builder() {
        let req = HttpRequest::get("https://example.org", Duration::from_millis(1500))
            .with_referrer("https://example.org/ref")
            .with_method(HttpMethod::PostJson, Some("{}".into()));
        assert_eq!(req.timeout_ms(), 1500);
        assert_eq!(req.method, HttpMethod::PostJson);
        assert_eq!(req.referrer.as_deref(), Some("https://example.org/ref"));
    }
}
