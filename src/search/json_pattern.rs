//! JSON-based listing extraction.
use super::html::{is_blank, is_valid_html};
use super::pattern::SearchPattern;
use super::regex_pattern::{UrlBuilder, DEFAULT_MAX_RESULTS};
use super::StopSignal;
use crate::error::{Result, SearchError};
use crate::http::HttpMethod;
use crate::result::SearchResult;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cmp::Reverse;

const ITEM_KEYS: &[&str] = &["results", "torrents", "data", "items"];

type BodyBuilder = dyn Fn(&str, u32) -> String + Send + Sync;

/// Finds the item array of a response: `pointer` when given, else the root
/// array, a well-known key, or a Solr-style `response.docs`.
pub fn locate_items<'v>(value: &'v Value, pointer: Option<&str>) -> Option<&'v Vec<Value>> {
    if let Some(pointer) = pointer {
        return value.pointer(pointer).and_then(Value::as_array);
    }
    if let Some(array) = value.as_array() {
        return Some(array);
    }
    ITEM_KEYS
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_array))
        .or_else(|| value.pointer("/response/docs").and_then(Value::as_array))
}

/// A [`SearchPattern`] over a JSON API whose items deserialize into `T`.
///
/// Items are ordered by descending priority (usually the seed count) with
/// a stable sort before mapping.
pub struct JsonSearchPattern<T> {
    name: String,
    url_builder: Box<UrlBuilder>,
    items_pointer: Option<String>,
    priority: Box<dyn Fn(&T) -> i64 + Send + Sync>,
    mapper: Box<dyn Fn(&T) -> Result<SearchResult> + Send + Sync>,
    max_results: usize,
    method: HttpMethod,
    body_builder: Option<Box<BodyBuilder>>,
    headers: Vec<(String, String)>,
}

impl<T: DeserializeOwned> JsonSearchPattern<T> {
    pub fn new(
        name: impl Into<String>,
        url_builder: impl Fn(&str, u32) -> String + Send + Sync + 'static,
        mapper: impl Fn(&T) -> Result<SearchResult> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            url_builder: Box::new(url_builder),
            items_pointer: None,
            priority: Box::new(|_| 0),
            mapper: Box::new(mapper),
            max_results: DEFAULT_MAX_RESULTS,
            method: HttpMethod::Get,
            body_builder: None,
            headers: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: impl Fn(&T) -> i64 + Send + Sync + 'static) -> Self {
        self.priority = Box::new(priority);
        self
    }

    /// JSON pointer (`/a/b`) to the item array.
    pub fn with_items_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.items_pointer = Some(pointer.into());
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn with_request(
        mut self,
        method: HttpMethod,
        body_builder: impl Fn(&str, u32) -> String + Send + Sync + 'static,
    ) -> Self {
        self.method = method;
        self.body_builder = Some(Box::new(body_builder));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Deserializes and orders the items of one page.
    pub fn parse_items(&self, body: &str) -> Result<Vec<T>> {
        let value: Value = serde_json::from_str(body)?;
        let Some(raw_items) = locate_items(&value, self.items_pointer.as_deref()) else {
            return Err(SearchError::parse(&self.name, "no item array in response"));
        };

        let mut items: Vec<T> = raw_items
            .iter()
            .filter_map(|raw| match T::deserialize(raw) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!("{}: skipping malformed item: {}", self.name, e);
                    None
                }
            })
            .collect();
        items.sort_by_key(|item| Reverse((self.priority)(item)));
        Ok(items)
    }
}

impl<T: DeserializeOwned> SearchPattern for JsonSearchPattern<T> {
    fn search_url(&self, encoded_keywords: &str, page: u32) -> String {
        (self.url_builder)(encoded_keywords, page)
    }

    fn parse_results(&self, body: &str, stop: &StopSignal) -> Result<Vec<SearchResult>> {
        if is_blank(body) {
            return Ok(Vec::new());
        }
        if !is_valid_html(body) {
            return Err(SearchError::Blocked {
                source_name: self.name.clone(),
            });
        }
        let items = self.parse_items(body)?;
        debug!("{}: {} items in page", self.name, items.len());

        let mut results = Vec::new();
        for item in &items {
            if stop.is_stopped() || results.len() >= self.max_results {
                break;
            }
            match (self.mapper)(item) {
                Ok(result) => results.push(result),
                Err(e) => warn!("{}: skipping item: {}", self.name, e),
            }
        }
        Ok(results)
    }

    fn http_method(&self) -> HttpMethod {
        self.method
    }

    fn request_body(&self, encoded_keywords: &str, page: u32) -> Option<String> {
        self.body_builder
            .as_ref()
            .map(|build| build(encoded_keywords, page))
    }

    fn custom_headers(&self) -> Vec<(String, String)> {
        self.headers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_with::{serde_as, DisplayFromStr, PickFirst};

    #[serde_as]
    #[derive(Debug, Deserialize)]
    struct Item {
        name: String,
        #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
        seeders: i64,
    }

    fn pattern() -> JsonSearchPattern<Item> {
        JsonSearchPattern::new(
            "json-fixture",
            |kw, page| format!("https://example.org/api?q={kw}&page={page}"),
            |item: &Item| {
                SearchResult::builder()
                    .display_name(&item.name)
                    .source("json-fixture")
                    .build()
            },
        )
        .with_priority(|item| item.seeders)
    }

    #[test]
    fn test_items_sorted_by_seeds_stably() {
        let body = r#"{"torrents": [
            {"name": "a", "seeders": 1},
            {"name": "b", "seeders": "9"},
            {"name": "c", "seeders": 1},
            {"name": "d", "seeders": 9}
        ]}"#;
        let names: Vec<_> = pattern()
            .parse_results(body, &StopSignal::new())
            .unwrap()
            .iter()
            .map(|r| r.display_name().to_string())
            .collect();
        assert_eq!(names, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_malformed_items_are_skipped() {
        let body = r#"[{"name": "ok", "seeders": 2}, {"seeders": "x"}, {"name": "", "seeders": 1}]"#;
        let results = pattern().parse_results(body, &StopSignal::new()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].display_name(), "ok");
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let err = pattern()
            .parse_results("{not json", &StopSignal::new())
            .unwrap_err();
        assert!(matches!(err, SearchError::Json(_)));
        let err = pattern()
            .parse_results(r#"{"count": 0}"#, &StopSignal::new())
            .unwrap_err();
        assert!(matches!(err, SearchError::Parse { .. }));
    }

    #[test]
    fn test_empty_body_has_no_items() {
        assert!(pattern().parse_results("", &StopSignal::new()).unwrap().is_empty());
    }

    #[test]
    fn test_locate_items() {
        let value: Value =
            serde_json::from_str(r#"{"response": {"docs": [{"x": 1}]}}"#).unwrap();
        assert_eq!(locate_items(&value, None).map(Vec::len), Some(1));
        assert_eq!(locate_items(&value, Some("/response/docs")).map(Vec::len), Some(1));
        assert!(locate_items(&value, Some("/missing")).is_none());
    }

    #[test]
    fn test_post_request_body() {
        let p = pattern().with_request(HttpMethod::PostJson, |kw, page| {
            format!(r#"{{"q":"{kw}","page":{page}}}"#)
        });
        assert_eq!(p.http_method(), HttpMethod::PostJson);
        assert_eq!(
            p.request_body("abc", 3).as_deref(),
            Some(r#"{"q":"abc","page":3}"#)
        );
    }
}
