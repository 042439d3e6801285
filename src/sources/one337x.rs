//! 1337x listing pages give names and details links only; size, seeds and
//! the magnet come from crawling each details page.
use crate::error::{Result, SearchError};
use crate::named_regex::{Matcher, Pattern};
use crate::result::SearchResult;
use crate::search::html::{decode_text, parse_count, parse_info_hash, MarkerBounds};
use crate::search::{RegexDetailsCrawler, RegexSearchPattern, SourceCategory};
use crate::size::parse_size;
use crate::sources::SourceDefinition;
use lazy_static::lazy_static;
use std::sync::Arc;

pub const NAME: &str = "1337x";
pub const DEFAULT_DOMAIN: &str = "www.1377x.to";
const MAX_RESULTS: usize = 20;

lazy_static! {
    static ref LISTING_ROW: Pattern = Pattern::compile(concat!(
        r#"(?is)<td class="coll-1 name">.*?<a href="(?<detailsUrl>/torrent/[^"]+)">(?<displayName>.*?)</a>.*?"#,
        r#"<td class="coll-2 seeds">(?<seeds>\d*)</td>"#,
    ))
    .expect("1337x listing pattern");
    static ref DETAILS: Pattern = Pattern::compile(concat!(
        r#"(?is)<div class="box-info-heading clearfix">.*?"#,
        r#"<a class="[^"]*" href="(?<magnet>magnet:[^"]*)"[^>]*>.*?"#,
        r#"<strong>Total size</strong>.*?<span>(?<size>.*?)</span>.*?"#,
        r#"<strong>Date uploaded</strong>.*?<span>(?<creationDate>.*?)</span>.*?"#,
        r#"<strong>Seeders</strong>.*?<span class="seeds">(?<seeds>[0-9]+)</span>"#,
    ))
    .expect("1337x details pattern");
}

pub fn definition(domain: &str) -> SourceDefinition {
    SourceDefinition::new(NAME, SourceCategory::TorrentIndex, Arc::new(pattern(domain)))
        .with_crawler(Arc::new(crawler()))
}

pub fn pattern(domain: &str) -> RegexSearchPattern {
    let search_domain = domain.to_string();
    let row_domain = domain.to_string();
    RegexSearchPattern::new(
        NAME,
        move |keywords, page| format!("https://{search_domain}/search/{keywords}/{page}/"),
        LISTING_ROW.clone(),
        move |m| map_row(&row_domain, m),
    )
    .with_bounds(MarkerBounds::new(r#"<table class="table-list"#, "</table>"))
    .with_max_results(MAX_RESULTS)
}

pub fn crawler() -> RegexDetailsCrawler {
    RegexDetailsCrawler::new(NAME, DETAILS.clone(), map_details).with_max_results(1)
}

fn map_row(domain: &str, m: &Matcher<'_, '_>) -> Result<SearchResult> {
    let name = decode_text(m.group("displayName").unwrap_or_default());
    let path = m
        .group("detailsUrl")
        .ok_or_else(|| SearchError::parse(NAME, "row without a details link"))?;
    SearchResult::builder()
        .display_name(name)
        .source(NAME)
        .details_url(format!("https://{domain}{path}"))
        .preliminary(true)
        .crawlable()
        .build()
}

fn map_details(parent: &Arc<SearchResult>, m: &Matcher<'_, '_>) -> Result<SearchResult> {
    let magnet = html_escape::decode_html_entities(m.group("magnet").unwrap_or_default()).into_owned();
    let info_hash = parse_info_hash(&magnet)
        .ok_or_else(|| SearchError::parse(NAME, format!("no info hash on {}", parent.details_url())))?;
    SearchResult::crawled_from(parent)
        .display_name(parent.display_name())
        .file(
            format!("{}.torrent", parent.display_name()),
            parse_size(m.group("size").unwrap_or_default()),
        )
        .torrent(
            magnet.clone(),
            info_hash,
            parse_count(m.group("seeds").unwrap_or_default()),
            magnet,
        )
        .build()
}
