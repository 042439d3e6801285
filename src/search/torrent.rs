//! Expansion of torrent payloads into per-file results.
//!
//! Decoding the payload itself is left to a [`TorrentParser`]; magnet links
//! are turned into payloads by a [`MagnetResolver`].
use super::crawl::CrawlingStrategy;
use super::StopSignal;
use crate::error::Result;
use crate::result::SearchResult;
use log::warn;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "ogg", "oga", "opus", "wav", "aac", "wma"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFile {
    /// Slash-separated path inside the torrent.
    pub path: String,
    pub size: i64,
    /// BEP 47 padding file.
    pub pad: bool,
}

impl TorrentFile {
    pub fn new(path: impl Into<String>, size: i64) -> Self {
        Self {
            path: path.into(),
            size,
            pad: false,
        }
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn directory(&self) -> &str {
        self.path.rsplit_once('/').map_or("", |(dir, _)| dir)
    }

    fn is_audio(&self) -> bool {
        crate::result::file_extension(self.file_name())
            .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMeta {
    pub name: String,
    /// Lower-case hex; may be empty when the parser cannot compute it.
    pub info_hash: String,
    pub files: Vec<TorrentFile>,
}

impl TorrentMeta {
    pub fn total_size(&self) -> i64 {
        self.files.iter().filter(|f| !f.pad).map(|f| f.size.max(0)).sum()
    }
}

/// Decodes a `.torrent` payload.
pub trait TorrentParser: Send + Sync {
    fn parse(&self, data: &[u8]) -> Result<TorrentMeta>;
}

/// Fetches the metadata payload behind a magnet link.
pub trait MagnetResolver: Send + Sync {
    fn resolve(&self, magnet: &str, timeout: Duration) -> Result<Vec<u8>>;
}

struct Album<'m> {
    directory: &'m str,
    size: i64,
    tracks: usize,
}

/// Directories holding two or more audio tracks, in order of first track.
fn find_albums<'m>(files: &[&'m TorrentFile]) -> Vec<Album<'m>> {
    let mut albums: Vec<Album<'m>> = Vec::new();
    let mut by_directory: HashMap<&'m str, usize> = HashMap::new();
    for &file in files {
        if !file.is_audio() {
            continue;
        }
        let index = *by_directory.entry(file.directory()).or_insert(albums.len());
        if index == albums.len() {
            albums.push(Album {
                directory: file.directory(),
                size: 0,
                tracks: 0,
            });
        }
        albums[index].size += file.size.max(0);
        albums[index].tracks += 1;
    }
    albums.retain(|a| a.tracks >= 2);
    albums
}

/// One result per contained file, followed by one result per album when
/// `detect_albums` is set and two or more audio tracks share a directory.
pub fn crawl_torrent_info(
    parent: &Arc<SearchResult>,
    meta: &TorrentMeta,
    detect_albums: bool,
    stop: &StopSignal,
) -> Vec<SearchResult> {
    let torrent = parent.torrent();
    let url = torrent
        .map(|t| t.url.clone())
        .or_else(|| parent.crawl_url().map(str::to_string))
        .unwrap_or_default();
    let info_hash = torrent
        .map(|t| t.info_hash.clone())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| meta.info_hash.clone());
    let seeds = torrent.map_or(0, |t| t.seeds);
    let referrer = torrent
        .map(|t| t.referrer_url.clone())
        .unwrap_or_else(|| parent.details_url().to_string());

    let build = |display_name: &str, filename: &str, size: i64| {
        SearchResult::crawled_from(parent)
            .display_name(display_name)
            .file(filename, size)
            .torrent(url.as_str(), info_hash.as_str(), seeds, referrer.as_str())
            .build()
    };

    let files: Vec<&TorrentFile> = meta.files.iter().filter(|f| !f.pad).collect();
    let mut built = Vec::with_capacity(files.len());
    for file in &files {
        if stop.is_stopped() {
            break;
        }
        built.push(build(file.file_name(), file.file_name(), file.size));
    }
    if detect_albums {
        for album in find_albums(&files) {
            if stop.is_stopped() {
                break;
            }
            let title = album
                .directory
                .rsplit('/')
                .next()
                .filter(|d| !d.is_empty())
                .unwrap_or(meta.name.as_str());
            built.push(build(title, title, album.size));
        }
    }

    built
        .into_iter()
        .filter_map(|result| {
            result
                .map_err(|e| warn!("Skipping torrent entry of {}: {}", parent.display_name(), e))
                .ok()
        })
        .collect()
}

/// Crawls `.torrent` payloads (or resolved magnets) into per-file results.
pub struct TorrentCrawler {
    parser: Arc<dyn TorrentParser>,
    detect_albums: bool,
}

impl TorrentCrawler {
    pub fn new(parser: Arc<dyn TorrentParser>) -> Self {
        Self {
            parser,
            detect_albums: true,
        }
    }

    pub fn detect_albums(mut self, detect: bool) -> Self {
        self.detect_albums = detect;
        self
    }
}

impl CrawlingStrategy for TorrentCrawler {
    fn crawl_url(&self, result: &SearchResult) -> Option<String> {
        result
            .torrent()
            .map(|t| t.url.clone())
            .or_else(|| result.crawl_url().map(str::to_string))
    }

    fn crawl_result(
        &self,
        parent: &Arc<SearchResult>,
        data: Option<&[u8]>,
        stop: &StopSignal,
    ) -> Result<Vec<SearchResult>> {
        let Some(data) = data else {
            return Ok(Vec::new());
        };
        let meta = self.parser.parse(data)?;
        Ok(crawl_torrent_info(parent, &meta, self.detect_albums, stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchError;

    struct FixedParser(TorrentMeta);

    impl TorrentParser for FixedParser {
        fn parse(&self, data: &[u8]) -> Result<TorrentMeta> {
            if data.is_empty() {
                return Err(SearchError::parse("torrent", "empty payload"));
            }
            Ok(self.0.clone())
        }
    }

    fn parent() -> Arc<SearchResult> {
        Arc::new(
            SearchResult::builder()
                .display_name("Open Music Pack")
                .source("fixture")
                .details_url("https://example.org/t/9")
                .file("Open Music Pack.torrent", -1)
                .torrent("https://example.org/t/9.torrent", "ab".repeat(20), 17, "https://example.org/t/9")
                .preliminary(true)
                .crawlable()
                .build()
                .unwrap(),
        )
    }

    fn meta() -> TorrentMeta {
        TorrentMeta {
            name: "Open Music Pack".into(),
            info_hash: "cd".repeat(20),
            files: vec![
                TorrentFile::new("Open Music Pack/Album One/01.mp3", 100),
                TorrentFile::new("Open Music Pack/Album One/02.mp3", 200),
                TorrentFile {
                    path: ".pad/1".into(),
                    size: 5,
                    pad: true,
                },
                TorrentFile::new("Open Music Pack/cover.jpg", 50),
                TorrentFile::new("Open Music Pack/bonus.flac", 400),
            ],
        }
    }

    #[test]
    fn test_one_result_per_file() {
        let results = crawl_torrent_info(&parent(), &meta(), false, &StopSignal::new());
        let names: Vec<_> = results.iter().map(|r| r.display_name()).collect();
        assert_eq!(names, vec!["01.mp3", "02.mp3", "cover.jpg", "bonus.flac"]);
        assert!(results.iter().all(|r| r.seeds() == Some(17)));
        assert!(results.iter().all(|r| r.info_hash() == Some("ab".repeat(20).as_str())));
        assert!(results.iter().all(|r| r.is_crawled() && !r.is_preliminary()));
    }

    #[test]
    fn test_albums_are_added_after_tracks() {
        let results = crawl_torrent_info(&parent(), &meta(), true, &StopSignal::new());
        let names: Vec<_> = results.iter().map(|r| r.display_name()).collect();
        assert_eq!(
            names,
            vec!["01.mp3", "02.mp3", "cover.jpg", "bonus.flac", "Album One"]
        );
        assert_eq!(results[4].size(), Some(300));
        assert_eq!(results[0].size(), Some(100));
    }

    #[test]
    fn test_grouped_tracks_stay_searchable() {
        let meta = TorrentMeta {
            name: "Pack".into(),
            info_hash: String::new(),
            files: vec![
                TorrentFile::new("Pack/Album/01 Intro.mp3", 10),
                TorrentFile::new("Pack/Album/02 Outro.mp3", 20),
            ],
        };
        let results = crawl_torrent_info(&parent(), &meta, true, &StopSignal::new());
        let names: Vec<_> = results.iter().map(|r| r.display_name()).collect();
        assert_eq!(names, vec!["01 Intro.mp3", "02 Outro.mp3", "Album"]);
        assert_eq!(results[2].size(), Some(30));
    }

    #[test]
    fn test_stopped_expansion_yields_nothing() {
        let stop = StopSignal::new();
        stop.stop();
        assert!(crawl_torrent_info(&parent(), &meta(), true, &stop).is_empty());
    }

    #[test]
    fn test_total_size_skips_padding() {
        assert_eq!(meta().total_size(), 750);
    }

    #[test]
    fn test_crawler_uses_parser() {
        let crawler = TorrentCrawler::new(Arc::new(FixedParser(meta())));
        let p = parent();
        assert_eq!(
            crawler.crawl_url(&p).as_deref(),
            Some("https://example.org/t/9.torrent")
        );
        let stop = StopSignal::new();
        assert_eq!(crawler.crawl_result(&p, Some(b"d4:infoe"), &stop).unwrap().len(), 5);
        assert!(crawler.crawl_result(&p, Some(b""), &stop).is_err());
        assert!(crawler.crawl_result(&p, None, &stop).unwrap().is_empty());
    }
}
