//! archive.org advanced search, crawled through the item metadata API.
use crate::error::{Result, SearchError};
use crate::http::encode_keywords;
use crate::result::{is_streamable, SearchResult};
use crate::search::{CrawlingStrategy, JsonSearchPattern, PerformerConfig, SourceCategory, StopSignal};
use crate::sources::SourceDefinition;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, OneOrMany, PickFirst};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NAME: &str = "Archive.org";
const ROWS: usize = 50;
const TORRENT_SEEDS: i32 = 3;
const METADATA_FORMAT: &str = "metadata";

#[serde_as]
#[derive(Debug, Deserialize)]
pub struct ArchiveDoc {
    pub identifier: String,
    #[serde_as(as = "Option<OneOrMany<_>>")]
    pub title: Option<Vec<String>>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub downloads: Option<i64>,
    #[serde(default)]
    pub publicdate: Option<String>,
    #[serde(default)]
    pub mediatype: Option<String>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub size: Option<i64>,
}

/// The metadata API lists files as an array; the older details API keys
/// them by path.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FileList {
    Listed(Vec<ArchiveFile>),
    Keyed(BTreeMap<String, ArchiveFile>),
}

impl Default for FileList {
    fn default() -> Self {
        FileList::Listed(Vec::new())
    }
}

impl FileList {
    fn into_files(self) -> Vec<ArchiveFile> {
        match self {
            FileList::Listed(files) => files,
            FileList::Keyed(files) => files
                .into_iter()
                .map(|(name, file)| ArchiveFile { name, ..file })
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ItemMetadata {
    #[serde(default)]
    files: FileList,
}

pub fn definition() -> SourceDefinition {
    SourceDefinition::new(NAME, SourceCategory::Cloud, Arc::new(pattern()))
        .with_crawler(Arc::new(ArchiveCrawler))
        .with_config(PerformerConfig {
            max_pages: 1,
            num_crawls: 6,
        })
}

pub fn pattern() -> JsonSearchPattern<ArchiveDoc> {
    JsonSearchPattern::new(
        NAME,
        |keywords, page| {
            format!(
                "https://archive.org/advancedsearch.php?q={keywords}\
                 &fl%5B%5D=identifier&fl%5B%5D=title&fl%5B%5D=mediatype\
                 &fl%5B%5D=downloads&fl%5B%5D=publicdate\
                 &rows={ROWS}&page={page}&output=json"
            )
        },
        map_doc,
    )
    .with_items_pointer("/response/docs")
    .with_priority(|doc| doc.downloads.unwrap_or(0))
    .with_max_results(ROWS)
}

fn map_doc(doc: &ArchiveDoc) -> Result<SearchResult> {
    let identifier = doc.identifier.trim();
    if identifier.is_empty() {
        return Err(SearchError::parse(NAME, "document without an identifier"));
    }
    let title = doc
        .title
        .as_ref()
        .and_then(|titles| titles.first())
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .unwrap_or(identifier);

    let builder = SearchResult::builder()
        .display_name(title)
        .source(NAME)
        .details_url(format!("https://archive.org/details/{identifier}"))
        .thumbnail_url(format!("https://archive.org/services/img/{identifier}"))
        .creation_time(doc.publicdate.as_deref().and_then(parse_public_date))
        .preliminary(true)
        .crawl_url(metadata_url(identifier));
    match doc.downloads {
        Some(downloads) => builder.view_count(downloads),
        None => builder,
    }
    .build()
}

pub fn metadata_url(identifier: &str) -> String {
    format!("https://archive.org/metadata/{identifier}")
}

fn parse_public_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Item identifier of a search result, taken from its crawl URL.
fn identifier_of(result: &SearchResult) -> Option<&str> {
    result
        .crawl_url()
        .and_then(|url| url.trim_end_matches('/').rsplit('/').next())
        .filter(|id| !id.is_empty())
}

fn download_url(identifier: &str, filename: &str) -> String {
    let path: Vec<String> = filename.split('/').map(encode_keywords).collect();
    format!("https://archive.org/download/{}/{}", identifier, path.join("/"))
}

/// Expands an item into one result per file: streams for playable media,
/// torrents for the item's `.torrent`, plain downloads otherwise.
pub struct ArchiveCrawler;

impl CrawlingStrategy for ArchiveCrawler {
    fn crawl_result(
        &self,
        parent: &Arc<SearchResult>,
        data: Option<&[u8]>,
        stop: &StopSignal,
    ) -> Result<Vec<SearchResult>> {
        let Some(data) = data else {
            return Ok(Vec::new());
        };
        let identifier = identifier_of(parent)
            .ok_or_else(|| SearchError::parse(NAME, "result without an item identifier"))?;
        let metadata: ItemMetadata = serde_json::from_slice(data)?;

        let files: Vec<ArchiveFile> = metadata
            .files
            .into_files()
            .into_iter()
            .map(|file| ArchiveFile {
                name: file.name.trim_start_matches('/').to_string(),
                ..file
            })
            .filter(|file| {
                !file.name.is_empty()
                    && !file
                        .format
                        .as_deref()
                        .is_some_and(|f| f.eq_ignore_ascii_case(METADATA_FORMAT))
            })
            .collect();
        let total_size: i64 = files.iter().map(|f| f.size.unwrap_or(0).max(0)).sum();
        debug!("{}: {} has {} files", NAME, identifier, files.len());

        let mut results = Vec::with_capacity(files.len());
        for file in &files {
            if stop.is_stopped() {
                break;
            }
            let base_name = file.name.rsplit('/').next().unwrap_or(&file.name);
            let url = download_url(identifier, &file.name);
            let builder = SearchResult::crawled_from(parent)
                .display_name(format!("{} ({})", base_name, parent.display_name()));

            let builder = if file.name.to_ascii_lowercase().ends_with(".torrent") {
                builder
                    .file(base_name, total_size)
                    .torrent(url.clone(), "", TORRENT_SEEDS, url)
            } else if is_streamable(&file.name) {
                builder
                    .file(base_name, file.size.unwrap_or(-1))
                    .streaming(url)
            } else {
                builder.file(base_name, file.size.unwrap_or(-1))
            };
            results.push(builder.build()?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{SearchPattern, StopSignal};

    const SEARCH: &str = r#"{"responseHeader": {"status": 0},
        "response": {"numFound": 2, "start": 0, "docs": [
            {"identifier": "quiet-item", "title": "Quiet Item", "downloads": 12,
             "mediatype": "audio", "publicdate": "2015-03-10T00:00:00Z"},
            {"identifier": "popular_item", "title": ["Popular Item"], "downloads": "3400"}
        ]}}"#;

    const METADATA: &str = r#"{"created": 1, "files": [
        {"name": "01 - Opening.mp3", "format": "VBR MP3", "size": "4000"},
        {"name": "cover.jpg", "format": "JPEG", "size": "100"},
        {"name": "popular_item_meta.xml", "format": "Metadata", "size": "900"},
        {"name": "popular_item_archive.torrent", "format": "Archive BitTorrent"}
    ]}"#;

    fn parent() -> Arc<SearchResult> {
        let results = pattern().parse_results(SEARCH, &StopSignal::new()).unwrap();
        Arc::new(results.into_iter().next().unwrap())
    }

    #[test]
    fn test_search_gives_preliminary_items_by_downloads() {
        let results = pattern().parse_results(SEARCH, &StopSignal::new()).unwrap();
        assert_eq!(results.len(), 2);
        let popular = &results[0];
        assert_eq!(popular.display_name(), "Popular Item");
        assert!(popular.is_preliminary());
        assert_eq!(popular.view_count(), Some(3400));
        assert_eq!(popular.crawl_url(), Some("https://archive.org/metadata/popular_item"));
        assert_eq!(popular.details_url(), "https://archive.org/details/popular_item");
        assert!(results[1].creation_time().is_some());
    }

    #[test]
    fn test_metadata_expands_into_files() {
        let parent = parent();
        let results = ArchiveCrawler
            .crawl_result(&parent, Some(METADATA.as_bytes()), &StopSignal::new())
            .unwrap();
        assert_eq!(results.len(), 3);

        let track = &results[0];
        assert_eq!(track.display_name(), "01 - Opening.mp3 (Popular Item)");
        assert!(track.is_streamable());
        assert_eq!(track.size(), Some(4000));
        assert_eq!(
            track.stream().map(|s| s.url.as_str()),
            Some("https://archive.org/download/popular_item/01%20-%20Opening.mp3")
        );

        let cover = &results[1];
        assert!(!cover.is_streamable());
        assert!(!cover.is_torrent());

        let torrent = &results[2];
        assert!(torrent.is_torrent());
        assert_eq!(torrent.size(), Some(4100));
        assert_eq!(torrent.seeds(), Some(TORRENT_SEEDS));
        assert!(results.iter().all(|r| r.is_crawled()));
    }

    #[test]
    fn test_keyed_file_listing() {
        let body = r#"{"files": {
            "/show.flv": {"format": "Flash Video", "size": "10"},
            "/show_files.xml": {"format": "Metadata"}
        }}"#;
        let results = ArchiveCrawler
            .crawl_result(&parent(), Some(body.as_bytes()), &StopSignal::new())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].filename(), Some("show.flv"));
        assert_eq!(results[0].extension().as_deref(), Some("flv"));
    }

    #[test]
    fn test_missing_item_and_bad_payloads() {
        let stop = StopSignal::new();
        assert!(ArchiveCrawler
            .crawl_result(&parent(), Some(&b"{}"[..]), &stop)
            .unwrap()
            .is_empty());
        assert!(ArchiveCrawler.crawl_result(&parent(), None, &stop).unwrap().is_empty());
        assert!(matches!(
            ArchiveCrawler.crawl_result(&parent(), Some(&b"<html>"[..]), &stop),
            Err(SearchError::Json(_))
        ));
    }

    #[test]
    fn test_identifier_of_crawl_url() {
        assert_eq!(identifier_of(&parent()), Some("popular_item"));
        assert_eq!(
            download_url("id", "disc 1/track #1.ogg"),
            "https://archive.org/download/id/disc%201/track%20%231.ogg"
        );
    }
}
