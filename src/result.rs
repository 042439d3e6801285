//! The search result model.
//!
//! A [`SearchResult`] is a base record plus an explicit set of capability
//! attachments (file, torrent, stream, crawl). Combinations are validated
//! once by [`SearchResultBuilder::build`]; afterwards a result is never
//! mutated and is shared as `Arc<SearchResult>`.
use crate::error::{Result, SearchError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

const STREAMABLE_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "flac", "ogg", "oga", "opus", "wav", "aac", "mp4", "m4v", "webm", "mkv", "avi",
    "mov", "flv", "ogv",
];

/// File-like capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub filename: String,
    /// Bytes, or -1 when unknown.
    pub size: i64,
}

/// Torrent-like capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TorrentInfo {
    pub url: String,
    pub info_hash: String,
    pub seeds: i32,
    pub referrer_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub url: String,
}

/// Where a preliminary result is fetched from to be expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlInfo {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    display_name: String,
    source: String,
    details_url: String,
    creation_time: Option<DateTime<Utc>>,
    thumbnail_url: Option<String>,
    view_count: Option<i64>,
    preliminary: bool,
    file: Option<FileInfo>,
    torrent: Option<TorrentInfo>,
    stream: Option<StreamInfo>,
    crawl: Option<CrawlInfo>,
    #[serde(skip)]
    parent: Option<Arc<SearchResult>>,
}

impl SearchResult {
    pub fn builder() -> SearchResultBuilder {
        SearchResultBuilder::default()
    }

    /// Starts a result expanded from `parent`, inheriting its source,
    /// details page and creation time.
    pub fn crawled_from(parent: &Arc<SearchResult>) -> SearchResultBuilder {
        SearchResultBuilder {
            source: parent.source.clone(),
            details_url: parent.details_url.clone(),
            creation_time: parent.creation_time,
            thumbnail_url: parent.thumbnail_url.clone(),
            parent: Some(Arc::clone(parent)),
            ..SearchResultBuilder::default()
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn details_url(&self) -> &str {
        &self.details_url
    }

    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        self.creation_time
    }

    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }

    pub fn view_count(&self) -> Option<i64> {
        self.view_count
    }

    pub fn is_preliminary(&self) -> bool {
        self.preliminary
    }

    pub fn file(&self) -> Option<&FileInfo> {
        self.file.as_ref()
    }

    pub fn torrent(&self) -> Option<&TorrentInfo> {
        self.torrent.as_ref()
    }

    pub fn stream(&self) -> Option<&StreamInfo> {
        self.stream.as_ref()
    }

    pub fn crawl(&self) -> Option<&CrawlInfo> {
        self.crawl.as_ref()
    }

    /// The result this one was crawled from.
    pub fn parent(&self) -> Option<&Arc<SearchResult>> {
        self.parent.as_ref()
    }

    pub fn filename(&self) -> Option<&str> {
        self.file.as_ref().map(|f| f.filename.as_str())
    }

    pub fn size(&self) -> Option<i64> {
        self.file.as_ref().map(|f| f.size)
    }

    pub fn seeds(&self) -> Option<i32> {
        self.torrent.as_ref().map(|t| t.seeds)
    }

    pub fn info_hash(&self) -> Option<&str> {
        self.torrent.as_ref().map(|t| t.info_hash.as_str())
    }

    pub fn crawl_url(&self) -> Option<&str> {
        self.crawl.as_ref().map(|c| c.url.as_str())
    }

    pub fn is_file(&self) -> bool {
        self.file.is_some()
    }

    pub fn is_torrent(&self) -> bool {
        self.torrent.is_some()
    }

    pub fn is_streamable(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_crawlable(&self) -> bool {
        self.crawl.is_some()
    }

    pub fn is_crawled(&self) -> bool {
        self.parent.is_some()
    }

    /// Lower-cased extension of the filename, or of the stream URL path.
    pub fn extension(&self) -> Option<String> {
        self.filename()
            .and_then(file_extension)
            .or_else(|| self.stream.as_ref().and_then(|s| url_extension(&s.url)))
    }

    /// Identity used to dedupe results within one query.
    pub fn uid(&self) -> String {
        let tail = self
            .info_hash()
            .filter(|h| !h.is_empty())
            .or_else(|| self.filename())
            .unwrap_or(&self.display_name);
        format!("{}|{}|{}", self.source, self.details_url, tail)
    }
}

/// Whether a filename names a playable media container.
pub fn is_streamable(filename: &str) -> bool {
    file_extension(filename).is_some_and(|ext| STREAMABLE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn file_extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.contains(['/', '\\', ' ']) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn url_extension(raw: &str) -> Option<String> {
    let path = url::Url::parse(raw)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| raw.to_string());
    path.rsplit('/').next().and_then(file_extension)
}

#[derive(Debug, Clone, Default)]
enum CrawlTarget {
    #[default]
    None,
    DetailsUrl,
    Url(String),
}

/// Assembles one concrete result from any subset of capabilities.
#[derive(Debug, Clone, Default)]
pub struct SearchResultBuilder {
    display_name: String,
    source: String,
    details_url: String,
    creation_time: Option<DateTime<Utc>>,
    thumbnail_url: Option<String>,
    view_count: Option<i64>,
    preliminary: bool,
    filename: Option<String>,
    size: Option<i64>,
    torrent: Option<TorrentInfo>,
    stream_url: Option<String>,
    crawl: CrawlTarget,
    parent: Option<Arc<SearchResult>>,
}

impl SearchResultBuilder {
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn details_url(mut self, url: impl Into<String>) -> Self {
        self.details_url = url.into();
        self
    }

    pub fn creation_time(mut self, time: Option<DateTime<Utc>>) -> Self {
        self.creation_time = time;
        self
    }

    pub fn thumbnail_url(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    pub fn view_count(mut self, count: i64) -> Self {
        self.view_count = Some(count);
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn file(self, filename: impl Into<String>, size: i64) -> Self {
        self.filename(filename).size(size)
    }

    pub fn torrent(
        mut self,
        url: impl Into<String>,
        info_hash: impl Into<String>,
        seeds: i32,
        referrer_url: impl Into<String>,
    ) -> Self {
        self.torrent = Some(TorrentInfo {
            url: url.into(),
            info_hash: info_hash.into(),
            seeds,
            referrer_url: referrer_url.into(),
        });
        self
    }

    pub fn streaming(mut self, url: impl Into<String>) -> Self {
        self.stream_url = Some(url.into());
        self
    }

    pub fn preliminary(mut self, preliminary: bool) -> Self {
        self.preliminary = preliminary;
        self
    }

    /// Crawl the details page.
    pub fn crawlable(mut self) -> Self {
        self.crawl = CrawlTarget::DetailsUrl;
        self
    }

    pub fn crawl_url(mut self, url: impl Into<String>) -> Self {
        self.crawl = CrawlTarget::Url(url.into());
        self
    }

    pub fn parent(mut self, parent: Arc<SearchResult>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn build(self) -> Result<SearchResult> {
        let display_name = self.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(SearchError::InvalidResult("missing display name".into()));
        }
        if self.source.trim().is_empty() {
            return Err(SearchError::InvalidResult(format!(
                "result \"{display_name}\" has no source"
            )));
        }

        let file = match (self.filename, self.size) {
            (Some(filename), size) if !filename.trim().is_empty() => Some(FileInfo {
                filename,
                size: size.unwrap_or(-1),
            }),
            (_, Some(_)) => {
                return Err(SearchError::InvalidResult(format!(
                    "result \"{display_name}\" has a size but no filename"
                )))
            }
            _ => None,
        };
        if self.torrent.is_some() && file.is_none() {
            return Err(SearchError::InvalidResult(format!(
                "torrent result \"{display_name}\" has no filename"
            )));
        }

        let crawl = match self.crawl {
            CrawlTarget::None => None,
            CrawlTarget::DetailsUrl if self.details_url.is_empty() => {
                return Err(SearchError::InvalidResult(format!(
                    "crawlable result \"{display_name}\" has no details url"
                )))
            }
            CrawlTarget::DetailsUrl => Some(CrawlInfo {
                url: self.details_url.clone(),
            }),
            CrawlTarget::Url(url) => Some(CrawlInfo { url }),
        };
        if self.preliminary && crawl.is_none() {
            return Err(SearchError::InvalidResult(format!(
                "preliminary result \"{display_name}\" has nothing to crawl"
            )));
        }

        Ok(SearchResult {
            display_name,
            source: self.source,
            details_url: self.details_url,
            creation_time: self.creation_time,
            thumbnail_url: self.thumbnail_url,
            view_count: self.view_count,
            preliminary: self.preliminary,
            file,
            torrent: self.torrent,
            stream: self.stream_url.map(|url| StreamInfo { url }),
            crawl,
            parent: self.parent,
        })
    }
}
