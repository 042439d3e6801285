//! The Pirate Bay listing pages. Two table layouts are in use across its
//! mirrors, so the older one is kept as a fallback.
use crate::error::{Result, SearchError};
use crate::named_regex::{Matcher, Pattern};
use crate::result::SearchResult;
use crate::search::html::{decode_text, parse_count, parse_info_hash};
use crate::search::{RegexSearchPattern, SourceCategory};
use crate::size::parse_size;
use crate::sources::SourceDefinition;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

pub const NAME: &str = "TPB";
pub const DEFAULT_DOMAIN: &str = "pirate-bay.info";
const MAX_RESULTS: usize = 30;

lazy_static! {
    static ref CURRENT_LAYOUT: Pattern = Pattern::compile(concat!(
        r#"(?is)<td class="vertTh">.*?<a href="[^"]*?" title="More from this category">(.*?)</a>.*?</td>.*?"#,
        r#"<a href="(?<detailsUrl>[^"]*?)" title="Details for (?<filename>[^"]*?)">.*?"#,
        r#"<td>(?<creationTime>.*?)</td>.*?"#,
        r#"<td><nobr><a href="magnet(?<magnet>.*?)" title="Download this torrent using magnet">.*?"#,
        r#"<td align="right">(?<size>.*?)</td>.*?"#,
        r#"<td align="right">(?<seeds>.*?)</td>.*?"#,
        r#"<td align="right">(?<leeches>.*?)</td>.*?</tr>"#,
    ))
    .expect("TPB listing pattern");
    static ref LEGACY_LAYOUT: Pattern = Pattern::compile(concat!(
        r#"(?is)<td class="vertTh">.*?<a href="[^"]*?" title="More from this category">(.*?)</a>.*?</td>.*?"#,
        r#"<a href="(?<detailsUrl>[^"]*?)" class="detLink" title="Details for (?<filename>[^"]*?)">.*?</a>.*?</div>.*?"#,
        r#"<a href="magnet(?<magnet>.*?)" title="Download this torrent using magnet">.*?"#,
        r#"Uploaded (?<creationTime>[^,]*?), Size (?<size>.*?), ULed by.*?"#,
        r#"<td align="right">(?<seeds>.*?)</td>.*?</tr>"#,
    ))
    .expect("TPB legacy listing pattern");
    static ref UNSAFE_FILENAME: Regex = Regex::new(r#"[\\/:*?"<>|\[\]]+"#).expect("filename pattern");
    static ref MONTH_DAY: Regex = Regex::new(r"^(\d{2})-(\d{2})$").expect("date pattern");
    static ref MONTH_DAY_YEAR: Regex =
        Regex::new(r"^(\d{2})-(\d{2})(?:&nbsp;|\s)+(\d{4})$").expect("date pattern");
    static ref MONTH_DAY_TIME: Regex =
        Regex::new(r"^(\d{2})-(\d{2})(?:&nbsp;|\s)+(\d{2}):(\d{2})$").expect("date pattern");
    static ref ISO_DATE: Regex = Regex::new(r"^(\d{4})-(\d{2})-(\d{2})").expect("date pattern");
}

pub fn definition(domain: &str) -> SourceDefinition {
    SourceDefinition::new(NAME, SourceCategory::TorrentIndex, Arc::new(pattern(domain)))
}

pub fn pattern(domain: &str) -> RegexSearchPattern {
    let search_domain = domain.to_string();
    let row_domain = domain.to_string();
    RegexSearchPattern::new(
        NAME,
        move |keywords, page| {
            format!(
                "https://{}/search/{}/{}/7/0",
                search_domain,
                keywords,
                page.saturating_sub(1)
            )
        },
        CURRENT_LAYOUT.clone(),
        move |m| map_row(&row_domain, m, Utc::now()),
    )
    .with_fallback(LEGACY_LAYOUT.clone())
    .with_max_results(MAX_RESULTS)
    .with_blocked_markers(["Cloudflare"])
}

fn map_row(domain: &str, m: &Matcher<'_, '_>, now: DateTime<Utc>) -> Result<SearchResult> {
    let title = m
        .group("filename")
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| SearchError::parse(NAME, "row without a title"))?;
    let magnet_tail = m
        .group("magnet")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SearchError::parse(NAME, "row without a magnet link"))?;

    // titles come double-escaped from some mirrors
    let title = decode_text(&decode_text(title));
    let display_name = UNSAFE_FILENAME.replace_all(&title, "_").into_owned();
    let magnet = format!("magnet{}", html_escape::decode_html_entities(magnet_tail));
    let info_hash = parse_info_hash(&magnet)
        .ok_or_else(|| SearchError::parse(NAME, format!("no info hash in {magnet}")))?;

    let details = m.group("detailsUrl").unwrap_or_default();
    let details_url = if details.starts_with("http") {
        details.to_string()
    } else {
        format!("https://{}/{}", domain, details.trim_start_matches('/'))
    };

    SearchResult::builder()
        .display_name(&display_name)
        .source(NAME)
        .details_url(details_url)
        .creation_time(parse_creation_time(
            m.group("creationTime").unwrap_or_default(),
            now,
        ))
        .file(
            format!("{display_name}.torrent"),
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

/// Upload dates as the listing prints them: `Today`, `Y-day`, `MM-DD YYYY`,
/// `MM-DD HH:MM` (this year) or `MM-DD` (this year). Unknown formats give
/// `None`.
pub fn parse_creation_time(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.contains("Today") || text.contains("<b>") || text.contains("mins ago") {
        return Some(now);
    }
    if text.contains("Y-day") {
        return Some(now - Duration::days(1));
    }

    let num = |s: &str| s.parse::<u32>().ok();
    let day = |year: i32, month: u32, day: u32| {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|dt| Utc.from_local_datetime(&dt).single())
    };

    if let Some(c) = MONTH_DAY_YEAR.captures(text) {
        return day(c[3].parse().ok()?, num(&c[1])?, num(&c[2])?);
    }
    if let Some(c) = MONTH_DAY_TIME.captures(text) {
        let date = NaiveDate::from_ymd_opt(now.year(), num(&c[1])?, num(&c[2])?)?;
        let time = date.and_hms_opt(num(&c[3])?, num(&c[4])?, 0)?;
        return Utc.from_local_datetime(&time).single();
    }
    if let Some(c) = MONTH_DAY.captures(text) {
        return day(now.year(), num(&c[1])?, num(&c[2])?);
    }
    if let Some(c) = ISO_DATE.captures(text) {
        return day(c[1].parse().ok()?, num(&c[2])?, num(&c[3])?);
    }
    None
}
