use fedsearch::error::{Result, SearchError};
use fedsearch::http::{HttpClient, HttpRequest};
use fedsearch::named_regex::Pattern;
use fedsearch::result::SearchResult;
use fedsearch::search::{
    PerformerConfig, RegexDetailsCrawler, SearchContext, SearchListener, SearchPattern,
    SearchPerformer, SourceCategory, StopSignal,
};
use fedsearch::token::SearchToken;
use parking_lot::Mutex;
use std::sync::Arc;

/// Serves canned bodies and records every requested URL.
#[derive(Default)]
struct RecordingHttp {
    requests: Mutex<Vec<String>>,
}

impl HttpClient for RecordingHttp {
    fn fetch(&self, request: &HttpRequest) -> Result<Vec<u8>> {
        self.requests.lock().push(request.url.clone());
        let url = request.url.as_str();
        if url.ends_with("/details/broken") {
            return Err(SearchError::HttpStatus {
                url: url.to_string(),
                status: 404,
            });
        }
        if let Some(id) = url.strip_prefix("https://example.org/details/") {
            return Ok(format!("<dl><dt>size</dt><dd>{id} MB</dd></dl>").into_bytes());
        }
        Ok(url.rsplit('/').next().unwrap_or_default().as_bytes().to_vec())
    }
}

#[derive(Default)]
struct Collector {
    results: Mutex<Vec<Arc<SearchResult>>>,
    errors: Mutex<Vec<String>>,
}

impl SearchListener for Collector {
    fn on_results(&self, _token: SearchToken, results: Vec<Arc<SearchResult>>) {
        self.results.lock().extend(results);
    }

    fn on_error(&self, _token: SearchToken, error: &SearchError) {
        self.errors.lock().push(error.to_string());
    }

    fn on_stopped(&self, _token: SearchToken) {}
}

/// The body is the page number; page 1 and 2 have two results, later pages
/// none.
struct NumberedPages;

impl SearchPattern for NumberedPages {
    fn search_url(&self, encoded_keywords: &str, page: u32) -> String {
        format!("https://example.org/search/{encoded_keywords}/{page}")
    }

    fn parse_results(&self, body: &str, _stop: &StopSignal) -> Result<Vec<SearchResult>> {
        let page: u32 = body.trim().parse().unwrap_or(0);
        if page == 0 || page > 2 {
            return Ok(Vec::new());
        }
        (1..=2)
            .map(|i| {
                SearchResult::builder()
                    .display_name(format!("result {page}.{i}"))
                    .source("numbered")
                    .build()
            })
            .collect()
    }
}

/// One preliminary result per listed id.
struct PreliminaryList(&'static [&'static str]);

impl SearchPattern for PreliminaryList {
    fn search_url(&self, _encoded_keywords: &str, page: u32) -> String {
        format!("https://example.org/list/{page}")
    }

    fn parse_results(&self, body: &str, _stop: &StopSignal) -> Result<Vec<SearchResult>> {
        if body != "1" {
            return Ok(Vec::new());
        }
        self.0
            .iter()
            .map(|id| {
                SearchResult::builder()
                    .display_name(format!("item {id}"))
                    .source("details")
                    .details_url(format!("https://example.org/details/{id}"))
                    .preliminary(true)
                    .crawlable()
                    .build()
            })
            .collect()
    }
}

fn performer(
    pattern: Arc<dyn SearchPattern>,
    http: &Arc<RecordingHttp>,
    config: PerformerConfig,
) -> SearchPerformer {
    let http: Arc<dyn HttpClient> = Arc::clone(http) as Arc<dyn HttpClient>;
    SearchPerformer::new(
        SearchToken::from_raw(1),
        "fixture",
        SourceCategory::Cloud,
        "free music",
        pattern,
        Arc::new(SearchContext::new(http)),
    )
    .with_config(config)
}

#[test]
fn test_empty_page_ends_paging() {
    let http = Arc::new(RecordingHttp::default());
    let listener = Collector::default();
    performer(
        Arc::new(NumberedPages),
        &http,
        PerformerConfig {
            max_pages: 10,
            num_crawls: 0,
        },
    )
    .perform(&listener);

    assert_eq!(
        *http.requests.lock(),
        vec![
            "https://example.org/search/free%20music/1",
            "https://example.org/search/free%20music/2",
            "https://example.org/search/free%20music/3",
        ]
    );
    let names: Vec<_> = listener
        .results
        .lock()
        .iter()
        .map(|r| r.display_name().to_string())
        .collect();
    assert_eq!(names, vec!["result 1.1", "result 1.2", "result 2.1", "result 2.2"]);
}

#[test]
fn test_max_pages_caps_requests() {
    let http = Arc::new(RecordingHttp::default());
    let listener = Collector::default();
    performer(
        Arc::new(NumberedPages),
        &http,
        PerformerConfig {
            max_pages: 1,
            num_crawls: 0,
        },
    )
    .perform(&listener);
    assert_eq!(http.requests.lock().len(), 1);
    assert_eq!(listener.results.lock().len(), 2);
}

#[test]
fn test_crawl_failure_does_not_abort_siblings() {
    let http = Arc::new(RecordingHttp::default());
    let listener = Collector::default();
    let crawler = RegexDetailsCrawler::new(
        "details",
        Pattern::compile(r"<dd>(?<size>[^<]+)</dd>").unwrap(),
        |parent, m| {
            SearchResult::crawled_from(parent)
                .display_name(parent.display_name())
                .file(
                    format!("{}.bin", parent.display_name()),
                    fedsearch::size::parse_size(m.group("size").unwrap_or_default()),
                )
                .build()
        },
    );

    performer(
        Arc::new(PreliminaryList(&["1", "broken", "3", "4"])),
        &http,
        PerformerConfig {
            max_pages: 1,
            num_crawls: 3,
        },
    )
    .with_crawler(Arc::new(crawler))
    .perform(&listener);

    let results = listener.results.lock();
    let sizes: Vec<_> = results.iter().map(|r| (r.display_name().to_string(), r.size())).collect();
    assert_eq!(
        sizes,
        vec![
            ("item 1".to_string(), Some(1 << 20)),
            ("item 3".to_string(), Some(3 << 20)),
        ]
    );
    assert!(results.iter().all(|r| r.is_crawled() && !r.is_preliminary()));
    // crawl errors are logged, never reported as performer errors
    assert!(listener.errors.lock().is_empty());
    assert!(!http
        .requests
        .lock()
        .iter()
        .any(|url| url.ends_with("/details/4")));
}
