//! News-source tools: discovery, RSS normalization, validation and scoring.

use std::collections::HashSet;

use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::context::Context;
use crate::error::{PipelineError, Result};
use crate::feed::{parse_feed, Feed};
use crate::json_extract::{extract_json, is_none_literal, json_fence, unwrap_markdown};
use crate::llm::Capability;
use crate::model::{clamp_score, NewsSource, SourceCandidate, RSS_UNAVAILABLE};

fn re_feed_words() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(rss|feeds?|atom)\b").expect("feed words regex"))
}

/// Lower-cased url without scheme, `www.` and trailing slash; used for dedup.
pub fn url_key(url: &str) -> String {
    let u = url.trim().to_ascii_lowercase();
    let u = u
        .strip_prefix("https://")
        .or_else(|| u.strip_prefix("http://"))
        .unwrap_or(&u);
    let u = u.strip_prefix("www.").unwrap_or(u);
    u.trim_end_matches('/').to_string()
}

fn host_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
}

/// Known and vetoed urls, as shown to the discovery prompt.
pub fn known_and_vetoed(sources: &[NewsSource], veto_score: f64) -> (Vec<String>, Vec<String>) {
    let (vetoed, known): (Vec<&NewsSource>, Vec<&NewsSource>) = sources
        .iter()
        .partition(|s| !s.is_available() || s.score <= veto_score);
    (
        known.iter().map(|s| s.url.clone()).collect(),
        vetoed.iter().map(|s| s.url.clone()).collect(),
    )
}

/// Urls from `{"news_sources": [...]}` or `{"sources": [...]}`; entries are
/// url strings or objects whose values are urls.
pub fn parse_discovered(value: &Value) -> Vec<String> {
    let list = match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .get("news_sources")
            .or_else(|| map.get("sources"))
            .and_then(Value::as_array),
        _ => None,
    };

    let mut out = Vec::new();
    for entry in list.into_iter().flatten() {
        match entry {
            Value::String(s) => out.push(s.trim().to_string()),
            Value::Object(map) => out.extend(
                map.values()
                    .filter_map(Value::as_str)
                    .map(|s| s.trim().to_string()),
            ),
            _ => {}
        }
    }
    out.retain(|u| u.starts_with("http://") || u.starts_with("https://"));
    out
}

fn dedup_excluding(urls: Vec<String>, exclude: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = exclude.iter().map(|u| url_key(u)).collect();
    urls.into_iter().filter(|u| seen.insert(url_key(u))).collect()
}

/// Ask for new RSS/Atom feeds, excluding everything already stored.
pub async fn discover_sources(ctx: &Context, existing: &[NewsSource]) -> Result<Vec<String>> {
    let cfg = ctx.pipeline();
    let (known, vetoed) = known_and_vetoed(existing, cfg.veto_score);

    let mut system = format!(
        "You are an expert in programming and software security. Your task is to find and return \
         ONLY URLs of RSS or Atom feeds with RELEVANT and UP-TO-DATE programming news.\n\n\
         ## Output\n\
         Reply ONLY with valid JSON shaped exactly like:\n\
         {{\"news_sources\": [\"https://example.com/rss.xml\", \"https://example.org/feed.atom\"]}}\n\n\
         ## Acceptance criteria\n\
         1. It must be a reachable (HTTP 200), well-formed RSS/Atom feed.\n\
         2. It must publish changelogs, releases, vulnerabilities or technical articles about \
         languages ({topics}) or frameworks.\n\
         3. Prefer official language blogs, standards bodies (IETF, W3C) and mailing lists exposed as RSS.\n\
         4. Security blogs publishing CVEs and patches relevant to developers are accepted.\n\n\
         ## Exclusions\n\
         - Generic aggregators (Medium, Reddit, Hacker News, Dev.to, personal Substacks).\n\
         - Purely commercial or marketing content, press releases, sponsorships, webinars.\n\
         - Job postings, events, meetups, conferences.\n\
         - Exact duplicates or http/https and www variants.\n\
         - More than one feed per domain.\n\
         - Any url listed below.\n\n\
         ### Stored URLs\n",
        topics = cfg.topics
    );
    for url in &known {
        system.push_str(&format!("- {url}\n"));
    }
    system.push_str("\n### Vetoed URLs\n");
    for url in &vetoed {
        system.push_str(&format!("- {url}\n"));
    }
    let user = "Provide a list of between 10 and 20 programming news feeds.";

    let answer = ctx.respond_text(Capability::Find, &system, user).await?;
    let mut exclude = known;
    exclude.extend(vetoed);
    exclude.extend(existing.iter().filter(|s| s.is_available()).map(|s| s.rss.clone()));
    let urls = dedup_excluding(parse_discovered(&extract_json(&answer)), &exclude);
    info!(target: "tools::sources", discovered = urls.len(), "feed discovery finished");
    Ok(urls)
}

/// Strip generic feed words and separators from a display name.
pub fn clean_source_name(raw: &str) -> String {
    let stripped = re_feed_words().replace_all(raw, " ");
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '-' || c == '|' || c == ':' || c == '·' || c.is_whitespace())
        .to_string()
}

fn rss_value(v: Option<&Value>) -> String {
    match v.and_then(Value::as_str).map(str::trim) {
        Some(s) if !s.is_empty() && !is_none_literal(s) => s.to_string(),
        _ => RSS_UNAVAILABLE.to_string(),
    }
}

/// `name -> {url, rss}` into candidates; unreachable feeds carry the sentinel.
pub fn parse_normalized(value: &Value) -> Vec<SourceCandidate> {
    let Some(map) = value.as_object() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut names = HashSet::new();
    for (raw_name, meta) in map {
        let rss = rss_value(meta.get("rss"));
        let url = meta
            .get("url")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| host_of(&rss).map(|h| format!("https://{h}")));
        let Some(url) = url else {
            warn!(target: "tools::sources", name = %raw_name, "normalized source without url");
            continue;
        };
        let mut name = clean_source_name(raw_name);
        if name.is_empty() {
            name = host_of(&url).unwrap_or_else(|| raw_name.clone());
        }
        if names.insert(name.clone()) {
            out.push(SourceCandidate { name, url, rss });
        }
    }
    out
}

/// Resolve readable names and canonical home urls for feed urls.
pub async fn normalize_rss(ctx: &Context, feeds: &[String]) -> Result<Vec<SourceCandidate>> {
    if feeds.is_empty() {
        return Ok(Vec::new());
    }
    let system = "You are an RSS metadata extractor.\n\n\
        For EACH feed given by the user:\n\
        1. Download the feed (HTTP 200 required). If it fails, set \"rss\": \"None\".\n\
        2. Take the channel <title> or, if missing, the HTML page <title>. Use that text \
        without the words 'RSS', 'Feed' or 'Atom' as the readable name.\n\
        3. Derive the home url by removing the feed path.\n\
        4. Return a single JSON object shaped like:\n\
        {\"Source name\": {\"url\": \"canonical url of the source\", \"rss\": \"url of the rss or feed\"}}\n\n\
        Extra rules:\n\
        - Force HTTPS whenever available.\n\
        - Do not return duplicated domains.\n\
        - Do not add any text outside the JSON.";
    let mut user = String::from("Extract metadata from these feed urls:\n");
    for f in feeds {
        user.push_str(&format!("- {f}\n"));
    }
    let answer = ctx.respond_text(Capability::Find, system, &user).await?;
    Ok(parse_normalized(&extract_json(&answer)))
}

/// Numeric score from a model answer; `None` when the answer is not a number.
pub fn parse_score(answer: &str) -> Option<f64> {
    let text = unwrap_markdown(answer);
    let candidate = json_fence(answer).unwrap_or(&text).trim();
    let value = match candidate.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Number(n)) => n.as_f64(),
            Ok(Value::Object(map)) => map.get("score").and_then(Value::as_f64),
            _ => None,
        },
    };
    value.filter(|v| v.is_finite())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub created: usize,
    pub updated: usize,
    pub unavailable: usize,
    /// Uniqueness conflicts.
    pub skipped: usize,
}

async fn fetch_feed(ctx: &Context, rss: &str) -> Option<Feed> {
    if rss == RSS_UNAVAILABLE {
        return None;
    }
    let resp = match ctx.http.get(rss).await {
        Ok(r) => r,
        Err(e) => {
            warn!(target: "tools::sources", rss, error = %e, "feed unreachable");
            return None;
        }
    };
    if !resp.is_ok() {
        warn!(target: "tools::sources", rss, status = resp.status, "feed answered non-200");
        return None;
    }
    match parse_feed(&resp.body) {
        Ok(feed) => Some(feed),
        Err(e) => {
            warn!(target: "tools::sources", rss, error = %e, "feed did not parse");
            None
        }
    }
}

async fn score_feed(ctx: &Context, candidate: &SourceCandidate, feed: &Feed) -> Result<Option<f64>> {
    let cfg = ctx.pipeline();
    if feed.headlines.is_empty() {
        return Ok(None);
    }
    let system = format!(
        "You rate programming news feeds. Given recent headlines of a feed, answer with a single \
         number between -1 and 1: 1 means consistently relevant releases, vulnerabilities and \
         tooling news about {}; 0 means mixed; -1 means irrelevant, commercial or stale. \
         Answer with the number only.",
        cfg.topics
    );
    let mut user = format!("Feed: {} ({})\nRecent headlines:\n", candidate.name, candidate.rss);
    for h in feed.headlines.iter().take(cfg.feed_sample_size) {
        match h.published {
            Some(d) => user.push_str(&format!("- [{d}] {}\n", h.title)),
            None => user.push_str(&format!("- {}\n", h.title)),
        }
    }
    let answer = ctx.chat(&system, &user).await?;
    let score = parse_score(&answer);
    if score.is_none() {
        warn!(target: "tools::sources", source = %candidate.name, answer = %answer, "non-numeric feed score discarded");
    }
    Ok(score.map(clamp_score))
}

/// Check each candidate feed, score it and create or update the stored source.
pub async fn validate_sources(
    ctx: &Context,
    candidates: &[SourceCandidate],
) -> Result<ValidationReport> {
    let cfg = ctx.pipeline();
    let mut report = ValidationReport::default();

    for candidate in candidates {
        let existing = ctx.store.get_news_source_by_name(&candidate.name).await?;
        let base_score = existing
            .as_ref()
            .map(|s| s.score)
            .unwrap_or(cfg.initial_source_score);

        let (rss, score) = match fetch_feed(ctx, &candidate.rss).await {
            Some(feed) => {
                let scored = score_feed(ctx, candidate, &feed).await?;
                (candidate.rss.clone(), scored.unwrap_or(base_score))
            }
            None => {
                report.unavailable += 1;
                counter!("news_sources_unavailable_total").increment(1);
                (RSS_UNAVAILABLE.to_string(), cfg.unavailable_score)
            }
        };
        let score = clamp_score(score);

        let outcome = match existing {
            Some(mut source) => {
                source.url = candidate.url.clone();
                source.rss = rss;
                source.score = score;
                ctx.store.update_news_source(source).await.map(|_| false)
            }
            None => ctx
                .store
                .create_news_source(NewsSource {
                    id: 0,
                    name: candidate.name.clone(),
                    url: candidate.url.clone(),
                    rss,
                    added_at: ctx.clock.now(),
                    score,
                })
                .await
                .map(|_| true),
        };

        match outcome {
            Ok(true) => report.created += 1,
            Ok(false) => report.updated += 1,
            Err(e) if e.is_already_exists() => {
                warn!(target: "tools::sources", source = %candidate.name, error = %e, "source already stored");
                report.skipped += 1;
            }
            Err(e) => return Err(PipelineError::from(e)),
        }
    }

    info!(
        target: "tools::sources",
        created = report.created,
        updated = report.updated,
        unavailable = report.unavailable,
        skipped = report.skipped,
        "feed validation finished"
    );
    Ok(report)
}

/// Score after an extraction pass: down on empty, up on productive, clamped.
pub fn score_after_extraction(score: f64, found_items: bool, cfg: &PipelineConfig) -> f64 {
    let delta = if found_items {
        cfg.score_increment
    } else {
        -cfg.score_decrement
    };
    clamp_score(score + delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn discovered_accepts_both_shapes() {
        let a = parse_discovered(&json!({"sources": ["https://a.test/rss", "nope"]}));
        assert_eq!(a, vec!["https://a.test/rss"]);
        let b = parse_discovered(&json!({"news_sources": [
            {"url1": "https://b.test/feed", "url2": "https://c.test/atom.xml"}
        ]}));
        assert_eq!(b, vec!["https://b.test/feed", "https://c.test/atom.xml"]);
    }

    #[test]
    fn dedup_ignores_scheme_and_www() {
        let urls = vec![
            "https://www.a.test/rss/".to_string(),
            "http://a.test/rss".to_string(),
            "https://b.test/rss".to_string(),
        ];
        let out = dedup_excluding(urls, &["https://b.test/rss".to_string()]);
        assert_eq!(out, vec!["https://www.a.test/rss/"]);
    }

    #[test]
    fn names_lose_feed_words() {
        assert_eq!(clean_source_name("The Go Blog RSS Feed"), "The Go Blog");
        assert_eq!(clean_source_name("Python Insider - Atom"), "Python Insider");
        assert_eq!(clean_source_name("Feedly"), "Feedly");
    }

    #[test]
    fn normalized_none_becomes_sentinel() {
        let out = parse_normalized(&json!({
            "Rust Blog": {"url": "https://blog.rust-lang.org", "rss": "https://blog.rust-lang.org/feed.xml"},
            "Dead RSS": {"url": "https://dead.test", "rss": "None"}
        }));
        assert_eq!(out.len(), 2);
        let dead = out.iter().find(|c| c.name == "Dead").unwrap();
        assert_eq!(dead.rss, RSS_UNAVAILABLE);
    }

    #[test]
    fn score_parsing() {
        assert_eq!(parse_score("0.8"), Some(0.8));
        assert_eq!(parse_score("```\n-0.25\n```"), Some(-0.25));
        assert_eq!(parse_score("{\"score\": 0.5}"), Some(0.5));
        assert_eq!(parse_score("quite good"), None);
        assert_eq!(parse_score("NaN"), None);
    }

    #[test]
    fn vetoed_split() {
        let mk = |name: &str, rss: &str, score: f64| NewsSource {
            id: 0,
            name: name.into(),
            url: format!("https://{name}.test"),
            rss: rss.into(),
            added_at: chrono::Utc::now(),
            score,
        };
        let sources = vec![
            mk("good", "https://good.test/rss", 0.5),
            mk("dead", RSS_UNAVAILABLE, 0.5),
            mk("bad", "https://bad.test/rss", -1.0),
        ];
        let (known, vetoed) = known_and_vetoed(&sources, -1.0);
        assert_eq!(known, vec!["https://good.test"]);
        assert_eq!(vetoed.len(), 2);
    }
}
