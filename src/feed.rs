//! RSS 2.0 / Atom parsing for feed validation.

use chrono::{DateTime, NaiveDate};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct Headline {
    pub title: String,
    pub link: Option<String>,
    pub published: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub title: Option<String>,
    pub headlines: Vec<Headline>,
}

#[derive(Debug, thiserror::Error)]
#[error("not an RSS or Atom document: {0}")]
pub struct FeedParseError(String);

// RSS 2.0

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(rename = "pubDate", default)]
    pub_date: Option<String>,
}

// Atom

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(default)]
    title: Option<Text>,
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    title: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: Option<String>,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

/// Element text with attributes (`type="html"`) ignored.
#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

/// Parse an RSS 2.0 or Atom document.
pub fn parse_feed(xml: &str) -> Result<Feed, FeedParseError> {
    let xml = scrub_html_entities(xml);
    let head: String = xml.chars().take(2048).collect();

    if head.contains("<feed") {
        let atom: AtomFeed = from_str(&xml).map_err(|e| FeedParseError(e.to_string()))?;
        return Ok(from_atom(atom));
    }
    let rss: Rss = from_str(&xml).map_err(|e| FeedParseError(e.to_string()))?;
    Ok(from_rss(rss))
}

fn from_rss(rss: Rss) -> Feed {
    let headlines = rss
        .channel
        .items
        .into_iter()
        .filter_map(|it| {
            let title = normalize_title(it.title.as_deref()?);
            (!title.is_empty()).then(|| Headline {
                title,
                link: it.link.map(|l| l.trim().to_string()),
                published: it.pub_date.as_deref().and_then(parse_rfc2822_date),
            })
        })
        .collect();
    Feed {
        title: rss.channel.title.map(|t| normalize_title(&t)),
        headlines,
    }
}

fn from_atom(atom: AtomFeed) -> Feed {
    let headlines = atom
        .entries
        .into_iter()
        .filter_map(|e| {
            let title = normalize_title(&e.title?.value);
            if title.is_empty() {
                return None;
            }
            let link = e
                .links
                .iter()
                .find(|l| l.rel.as_deref().unwrap_or("alternate") == "alternate")
                .or_else(|| e.links.first())
                .and_then(|l| l.href.clone());
            let published = e
                .published
                .as_deref()
                .or(e.updated.as_deref())
                .and_then(parse_rfc3339_date);
            Some(Headline {
                title,
                link,
                published,
            })
        })
        .collect();
    Feed {
        title: atom.title.map(|t| normalize_title(&t.value)),
        headlines,
    }
}

fn to_naive_date(dt: OffsetDateTime) -> Option<NaiveDate> {
    DateTime::from_timestamp(dt.unix_timestamp(), 0).map(|d| d.date_naive())
}

pub fn parse_rfc2822_date(ts: &str) -> Option<NaiveDate> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .and_then(to_naive_date)
}

pub fn parse_rfc3339_date(ts: &str) -> Option<NaiveDate> {
    OffsetDateTime::parse(ts.trim(), &Rfc3339)
        .ok()
        .and_then(to_naive_date)
}

/// Decode entities and collapse whitespace.
pub fn normalize_title(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

// Named HTML entities are not valid XML.
fn scrub_html_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
