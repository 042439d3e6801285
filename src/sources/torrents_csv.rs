//! torrents-csv.com JSON search service.
use crate::error::{Result, SearchError};
use crate::http::encode_keywords;
use crate::result::SearchResult;
use crate::search::html::{normalize_info_hash, parse_info_hash};
use crate::search::{JsonSearchPattern, SourceCategory};
use crate::sources::SourceDefinition;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use std::sync::Arc;

pub const NAME: &str = "TorrentsCSV";
const MAX_RESULTS: usize = 50;

/// One row of the service. Field names vary between deployments.
#[serde_as]
#[derive(Debug, Deserialize)]
pub struct CsvTorrent {
    #[serde(default, alias = "title", alias = "filename")]
    pub name: String,
    #[serde(default, alias = "info_hash", alias = "hash")]
    pub infohash: String,
    #[serde(default, alias = "magnet_uri", alias = "magnetUri")]
    pub magnet: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(alias = "size_bytes", alias = "length", alias = "bytes")]
    pub size: Option<i64>,
    #[serde(default, alias = "created_unix", alias = "createdAt", alias = "date", alias = "uploaded")]
    pub created: Option<Value>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(alias = "seeders", alias = "seeder")]
    pub seeds: Option<i64>,
}

pub fn definition() -> SourceDefinition {
    SourceDefinition::new(NAME, SourceCategory::TorrentIndex, Arc::new(pattern()))
}

pub fn pattern() -> JsonSearchPattern<CsvTorrent> {
    JsonSearchPattern::new(
        NAME,
        |keywords, _page| {
            format!("https://torrents-csv.com/service/search?q={keywords}&size={MAX_RESULTS}")
        },
        map_item,
    )
    .with_items_pointer("/torrents")
    .with_priority(|item| item.seeds.unwrap_or(0))
    .with_max_results(MAX_RESULTS)
}

fn map_item(item: &CsvTorrent) -> Result<SearchResult> {
    let name = item.name.trim();
    if name.is_empty() {
        return Err(SearchError::parse(NAME, "item without a name"));
    }
    let magnet = item
        .magnet
        .as_deref()
        .filter(|m| m.starts_with("magnet:"));
    let info_hash = normalize_info_hash(&item.infohash)
        .or_else(|| magnet.and_then(parse_info_hash))
        .ok_or_else(|| SearchError::parse(NAME, format!("no info hash for {name}")))?;
    let magnet = magnet.map(str::to_string).unwrap_or_else(|| {
        format!("magnet:?xt=urn:btih:{}&dn={}", info_hash, encode_keywords(name))
    });
    let seeds = item
        .seeds
        .unwrap_or(0)
        .clamp(0, i64::from(i32::MAX)) as i32;

    SearchResult::builder()
        .display_name(name)
        .source(NAME)
        .details_url(format!("https://torrents-csv.com/search?q={info_hash}"))
        .creation_time(item.created.as_ref().and_then(parse_created))
        .file(format!("{name}.torrent"), item.size.unwrap_or(-1))
        .torrent(magnet.clone(), info_hash, seeds, magnet)
        .build()
}

/// Unix seconds (or milliseconds), as a number or a string, or RFC 3339.
fn parse_created(value: &Value) -> Option<DateTime<Utc>> {
    let from_number = |n: i64| {
        if n > 100_000_000_000 {
            Utc.timestamp_millis_opt(n).single()
        } else {
            Utc.timestamp_opt(n, 0).single()
        }
    };
    match value {
        Value::Number(n) => n.as_i64().and_then(from_number),
        Value::String(s) => s.trim().parse::<i64>().ok().map_or_else(
            || {
                DateTime::parse_from_rfc3339(s.trim())
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            },
            from_number,
        ),
        _ => None,
    }
}
