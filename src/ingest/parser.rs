// src/ingest/parser.rs
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// One syndication item after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub url: String,
    /// Plain-text description, if the feed carried one.
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Parse an RSS 2.0 document. Items without a link are dropped; missing
/// titles become "Untitled"; unparseable dates become `now`.
pub fn parse_feed(xml: &str, now: DateTime<Utc>) -> Result<Vec<FeedItem>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    let mut skipped = 0u64;
    for it in rss.channel.item {
        let url = it.link.as_deref().map(str::trim).unwrap_or_default();
        if url.is_empty() {
            skipped += 1;
            continue;
        }
        let title = it
            .title
            .as_deref()
            .map(super::clean_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());
        let description = it
            .description
            .as_deref()
            .map(super::clean_text)
            .filter(|d| !d.is_empty());
        let published_at = it
            .pub_date
            .as_deref()
            .and_then(parse_published)
            .unwrap_or(now);

        out.push(FeedItem {
            title,
            url: url.to_string(),
            description,
            published_at,
        });
    }

    if skipped > 0 {
        tracing::debug!(target: "ingest", skipped, "feed items without link dropped");
        counter!("digest_items_skipped_total").increment(skipped);
    }
    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("digest_parse_ms").record(ms);
    Ok(out)
}

/// Permissive publish-date parsing: RFC 2822, RFC 3339, then a few common
/// layouts seen in the wild.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return Utc.timestamp_opt(dt.unix_timestamp(), 0).single();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%a, %d %b %Y %H:%M:%S %z", "%d %b %Y %H:%M:%S %z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%a, %d %b %Y %H:%M:%S GMT"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>Demo</title>
  <item>
    <title>Chip exports rise&nbsp;again</title>
    <link> https://example.test/a </link>
    <pubDate>Tue, 04 Mar 2025 08:30:00 +0700</pubDate>
    <description><![CDATA[<a href="x"><img src="y"/></a>Exports grew <b>12%</b>]]></description>
  </item>
  <item>
    <link>https://example.test/b</link>
    <pubDate>not a date</pubDate>
  </item>
  <item>
    <title>No link here</title>
  </item>
</channel></rss>"#;

    #[test]
    fn parses_items_and_skips_missing_links() {
        let now = Utc.with_ymd_and_hms(2025, 3, 5, 0, 0, 0).unwrap();
        let items = parse_feed(FEED, now).unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].title, "Chip exports rise again");
        assert_eq!(items[0].url, "https://example.test/a");
        assert_eq!(items[0].description.as_deref(), Some("Exports grew 12%"));
        assert_eq!(
            items[0].published_at,
            Utc.with_ymd_and_hms(2025, 3, 4, 1, 30, 0).unwrap()
        );

        assert_eq!(items[1].title, "Untitled");
        assert_eq!(items[1].published_at, now);
    }

    #[test]
    fn empty_channel_yields_no_items() {
        let xml = "<rss><channel><title>x</title></channel></rss>";
        assert!(parse_feed(xml, Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_feed("<rss><channel>", Utc::now()).is_err());
    }

    #[test]
    fn date_formats() {
        let want = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_published("2025-01-02T03:04:05Z"), Some(want));
        assert_eq!(parse_published("2025-01-02 03:04:05"), Some(want));
        assert_eq!(parse_published("Thu, 02 Jan 2025 03:04:05 GMT"), Some(want));
        assert_eq!(parse_published(""), None);
    }
}
