//! News tools: weekly extraction, summarization and the legacy redaction chain.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::Result;
use crate::json_extract::{extract_as, extract_json, is_none_literal, unwrap_markdown, Extraction};
use crate::llm::Capability;
use crate::model::{NewsBody, NewsItem, NewsSource, SourceRef};

use super::sources::score_after_extraction;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Headline as returned by the model, before date validation.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawHeadline {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl RawHeadline {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date.trim(), DATE_FORMAT).ok()
    }
}

/// Inclusive `[start, end]` date window ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn ending(today: NaiveDate, days: i64) -> Self {
        let start = Duration::try_days(days)
            .and_then(|window| today.checked_sub_signed(window))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end: today }
    }

    pub fn contains(&self, d: NaiveDate) -> bool {
        d >= self.start && d <= self.end
    }
}

fn headlines_from(text: &str) -> Vec<RawHeadline> {
    match extract_as::<Vec<RawHeadline>>(text) {
        Extraction::Value(v) => v,
        _ => match extract_as::<RawHeadline>(text) {
            Extraction::Value(one) => vec![one],
            _ => Vec::new(),
        },
    }
}

fn to_item(raw: &RawHeadline, window: &DateWindow, source: Option<SourceRef>) -> Option<NewsItem> {
    let title = raw.title.trim();
    let url = raw.url.trim();
    if title.is_empty() || url.is_empty() {
        return None;
    }
    let date = raw.parsed_date().filter(|d| window.contains(*d))?;
    Some(NewsItem {
        title: title.to_string(),
        url: url.to_string(),
        date,
        language: raw.language.clone().filter(|l| !l.trim().is_empty()),
        source,
        body: None,
    })
}

/// Headlines from each source published inside the recency window.
///
/// Every answered source has its score nudged by the outcome; with
/// `persist_scores == false` the new scores are only logged. A provider
/// error (rate limits included) is returned as is.
pub async fn extract_weekly_news(
    ctx: &Context,
    sources: &[NewsSource],
    persist_scores: bool,
) -> Result<Vec<NewsItem>> {
    let cfg = ctx.pipeline();
    let now = ctx.clock.now();
    let window = DateWindow::ending(now.date_naive(), cfg.recency_days);

    let system = format!(
        "You collect technology headlines focused on programming ({topics}) from the given RSS sources.\n\n\
         Today is {today}.\n\
         Consider ONLY news published BETWEEN {start} and {end} (last {days} days, inclusive).\n\n\
         FILTER RULES\n\
         - Use ONLY the title and the date of the RSS item; do not open the article.\n\
         - Translate the title into {locale} if it is in another language.\n\
         - Discard press releases, job offers, events or purely commercial content.\n\
         - Prioritize new versions, critical vulnerabilities, frameworks or useful developer tools.\n\
         - Do not invent data: if a field is missing or the date is absent, discard the item.\n\n\
         RESPONSE FORMAT\n\
         - Return ONLY a JSON list with no extra text, each element shaped like:\n\
         {{\"title\": \"Headline in {locale}\", \"url\": \"URL of the news\", \"date\": \"YYYY-MM-DD\"}}\n\
         - If there is no valid news, answer with an empty list: []\n",
        topics = cfg.topics,
        today = window.end.format("%d %B %Y"),
        start = window.start.format(DATE_FORMAT),
        end = window.end.format(DATE_FORMAT),
        days = cfg.recency_days,
        locale = cfg.locale,
    );

    let mut items: Vec<NewsItem> = Vec::new();
    let mut seen = HashSet::new();
    for (i, source) in sources.iter().enumerate() {
        info!(target: "tools::news", n = i + 1, total = sources.len(), source = %source.name, "extracting headlines");
        let user = format!(
            "Collect programming news from the last {} days.\nRSS source: {}\n",
            cfg.recency_days, source.rss
        );

        // A failed call leaves this source's score alone and ends the run.
        let answer = ctx
            .respond_text(Capability::Search, &system, &user)
            .await
            .inspect_err(|e| {
                warn!(target: "tools::news", source = %source.name, error = %e, "extraction failed");
            })?;

        let found: Vec<NewsItem> = headlines_from(&answer)
            .iter()
            .filter_map(|raw| to_item(raw, &window, Some(source.reference())))
            .filter(|item| seen.insert(item.url.clone()))
            .collect();

        let new_score = score_after_extraction(source.score, !found.is_empty(), cfg);
        debug!(
            target: "tools::news",
            source = %source.name,
            items = found.len(),
            old = source.score,
            new = new_score,
            "source score feedback"
        );
        if persist_scores && (new_score - source.score).abs() > f64::EPSILON {
            let mut updated = source.clone();
            updated.score = new_score;
            ctx.store.update_news_source(updated).await?;
        }
        items.extend(found);
    }

    counter!("news_extracted_total").increment(items.len() as u64);
    info!(target: "tools::news", items = items.len(), sources = sources.len(), "weekly extraction finished");
    Ok(items)
}

#[derive(Debug, Deserialize)]
struct SummaryFields {
    #[serde(default)]
    introduction: String,
    #[serde(default)]
    content: String,
}

/// `{"summary": {...}}` (or the legacy `sumary` key), as an object or a one-element list.
pub fn parse_summary(value: &Value) -> Extraction<NewsBody> {
    let obj = match value {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    let Some(inner) = obj.and_then(|o| o.get("summary").or_else(|| o.get("sumary"))) else {
        return Extraction::Empty;
    };
    match serde_json::from_value::<SummaryFields>(inner.clone()) {
        Ok(f) if !f.introduction.trim().is_empty() && !f.content.trim().is_empty() => {
            Extraction::Value(NewsBody::Summary {
                introduction: f.introduction.trim().to_string(),
                content: f.content.trim().to_string(),
            })
        }
        _ => Extraction::Empty,
    }
}

fn summary_system(locale: &str) -> String {
    format!(
        "You are a specialised technical writer. Open the URL, read the original source and write \
         a post in {locale} made of two parts:\n\
         - Introduction: a short, engaging paragraph summarising the announcement (45-80 words).\n\
         - Content: context, details, key changes and why it matters (300-600 words, subtitles allowed).\n\n\
         Quality rules:\n\
         - Invent nothing; everything must come from the source or official pages linked from it.\n\
         - Always visit the given URL. If the page does not load, skip the article.\n\
         - Quotes, if any, at most 20 words each.\n\
         - Clear, concise, neutral style. No opinions, only verifiable context.\n\n\
         Output:\n\
         - ONLY JSON, no comments or extra text, shaped like:\n\
         {{\"summary\": {{\"introduction\": \"...\", \"content\": \"...\"}}}}\n"
    )
}

/// Generate an introduction + content body for each item not already stored.
pub async fn summarize_news(ctx: &Context, items: Vec<NewsItem>) -> Result<Vec<NewsItem>> {
    let mut pending = Vec::with_capacity(items.len());
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item.url.clone()) {
            continue;
        }
        if ctx.store.get_news_by_url(&item.url).await?.is_some() {
            debug!(target: "tools::news", url = %item.url, "already stored, skipping");
            counter!("news_duplicates_total").increment(1);
            continue;
        }
        pending.push(item);
    }

    let system = summary_system(&ctx.pipeline().locale);
    let prompts: Vec<String> = pending
        .iter()
        .map(|item| format!("Write a post from the following url:\n{}\n", item.url))
        .collect();

    let answers: Vec<Option<String>> = match ctx.active_batch() {
        Some(runner) => {
            let profile = ctx.profiles.profile(Capability::Search);
            runner
                .run(&profile, &system, &prompts)
                .await?
                .iter()
                .map(|o| o.text())
                .collect()
        }
        None => {
            let mut out = Vec::with_capacity(prompts.len());
            for prompt in &prompts {
                out.push(Some(ctx.respond_text(Capability::Search, &system, prompt).await?));
            }
            out
        }
    };

    let mut done = Vec::with_capacity(pending.len());
    for (mut item, answer) in pending.into_iter().zip(answers) {
        let body = answer
            .map(|a| parse_summary(&extract_json(&a)))
            .unwrap_or(Extraction::Empty);
        match body {
            Extraction::Value(b) => {
                item.body = Some(b);
                done.push(item);
            }
            _ => {
                warn!(target: "tools::news", url = %item.url, "summary missing or invalid, discarding");
                counter!("news_discarded_total", "stage" => "summarize").increment(1);
            }
        }
    }
    info!(target: "tools::news", summarized = done.len(), "summarization finished");
    Ok(done)
}

// ------------------------------------------------------------
// Legacy chain: sites -> headlines -> cleanup -> redaction
// ------------------------------------------------------------

/// Ask for programming news sites (`{"sources": [...]}`).
pub async fn discover_news_sites(ctx: &Context, vetoed: &[String]) -> Result<Vec<String>> {
    let mut system = String::from(
        "You are an assistant that finds and provides links to programming news sources.\n\
         Make sure the URLs are relevant and up to date. Discard sources that are not maintained.\n\n\
         Always return a JSON list of links with this structure:\n\
         {\"sources\": [\"url1\", \"url2\"]}\n\n\
         Vetoed URLs you must not add:\n",
    );
    for url in vetoed {
        system.push_str(&format!(" - {url}\n"));
    }
    let user = "Provide a list of news sources related to programming.";
    let answer = ctx.respond_text(Capability::Find, &system, user).await?;

    let value = extract_json(&answer);
    let sites: Vec<String> = value
        .get("sources")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    info!(target: "tools::news", sites = sites.len(), "news sites discovered");
    Ok(sites)
}

/// Headlines per site; a failing site yields an empty list.
pub async fn collect_headlines(ctx: &Context, sites: &[String]) -> Vec<(String, Vec<RawHeadline>)> {
    let cfg = ctx.pipeline();
    let today = ctx.clock.now().date_naive();
    let system = format!(
        "You collect technology news from the given sources, with emphasis on programming ({topics}).\n\n\
         Today is {today}. Consider only news published this week.\n\n\
         - Analyze only the headlines, do not dig into the full content.\n\
         - Translate titles into {locale} if they are in another language.\n\
         - Discard press releases, job offers, events or purely commercial content.\n\
         - Prioritize releases, critical vulnerabilities, new frameworks or relevant developer tools.\n\
         - Do not invent information, use only the given source.\n\n\
         Return your answer ONLY as a JSON list shaped like:\n\
         [{{\"title\": \"Title of the news\", \"url\": \"URL of the news\", \"date\": \"YYYY-MM-DD\"}}]\n\n\
         If you find no relevant news, return an empty JSON list: []\n",
        topics = cfg.topics,
        today = today.format("%d %B %Y"),
        locale = cfg.locale,
    );

    let mut out = Vec::with_capacity(sites.len());
    for (i, site) in sites.iter().enumerate() {
        info!(target: "tools::news", n = i + 1, %site, "collecting headlines");
        let user = format!("Collect programming news.\nHere is the source URL: {site}.");
        let headlines = match ctx.respond_text(Capability::Find, &system, &user).await {
            Ok(answer) => headlines_from(&answer),
            Err(e) => {
                warn!(target: "tools::news", %site, error = %e, "headline collection failed");
                Vec::new()
            }
        };
        info!(target: "tools::news", %site, found = headlines.len(), "headlines collected");
        out.push((site.clone(), headlines));
    }
    out
}

/// Classify and de-duplicate headlines per site through the reasoning model.
/// Sites without a single headline inside the window are skipped.
pub async fn cleanup_news(
    ctx: &Context,
    collected: &[(String, Vec<RawHeadline>)],
) -> Result<Vec<NewsItem>> {
    let cfg = ctx.pipeline();
    let window = DateWindow::ending(ctx.clock.now().date_naive(), cfg.recency_days);
    let system = format!(
        "You are an assistant that organizes technology news. Return a JSON list shaped like:\n\
         [{{\"title\": \"Title of the news in {locale}\", \"date\": \"YYYY-MM-DD\", \
         \"language\": \"Related programming language (Python, Java, etc.)\", \
         \"source\": \"Source URL of the news\", \"url\": \"URL of the news\"}}]\n",
        locale = cfg.locale
    );

    let mut clean = Vec::new();
    let total: usize = collected.iter().map(|(_, h)| h.len()).sum();
    for (site, headlines) in collected {
        let recent = headlines
            .iter()
            .filter_map(RawHeadline::parsed_date)
            .any(|d| d >= window.start);
        if !recent {
            continue;
        }

        let payload = serde_json::json!({
            "source": site,
            "news": headlines
                .iter()
                .map(|h| serde_json::json!({"title": h.title, "url": h.url, "date": h.date}))
                .collect::<Vec<_>>(),
        });
        let user = format!(
            "Carefully analyze the provided news. They must be related to programming: {topics}. \
             Discard the ones that add no value, are irrelevant or duplicated. Prioritize releases, \
             critical vulnerabilities, new frameworks or relevant developer tools.\n{payload}",
            topics = cfg.topics
        );
        let answer = ctx.respond_text(Capability::Reasoner, &system, &user).await?;

        let site_ref = SourceRef {
            name: site.clone(),
            url: site.clone(),
            rss: String::new(),
        };
        let relaxed = DateWindow {
            start: NaiveDate::MIN,
            end: NaiveDate::MAX,
        };
        for raw in headlines_from(&answer) {
            let source = raw
                .source
                .as_ref()
                .filter(|s| !s.trim().is_empty())
                .map(|s| SourceRef {
                    name: s.trim().to_string(),
                    url: s.trim().to_string(),
                    rss: String::new(),
                })
                .unwrap_or_else(|| site_ref.clone());
            if let Some(item) = to_item(&raw, &relaxed, Some(source)) {
                clean.push(item);
            }
        }
    }
    info!(target: "tools::news", before = total, after = clean.len(), "news cleanup finished");
    Ok(clean)
}

/// Ascending by date; stable for equal dates.
pub fn sort_by_date(items: &mut [NewsItem]) {
    items.sort_by_key(|i| i.date);
}

/// One article per item; a bare `None` answer discards the item.
pub async fn redact_news(ctx: &Context, items: Vec<NewsItem>) -> Result<Vec<NewsItem>> {
    let cfg = ctx.pipeline();
    let system = format!(
        "You are a professional writer of technology news articles, writing in {locale}.\n\
         Use the source and the URL of the news to provide context.\n\
         Use a direct and professional, yet friendly, tone.\n\
         Return the result in Markdown.\n\n\
         At the end of the article include a horizontal rule `---` and invite readers to visit the news page.\n\n\
         Do not include dates or urls in the article.\n\
         Do not invent information, use only the provided data.\n\
         If the news URL is not valid, discard it by answering only None.",
        locale = cfg.locale
    );

    let mut out = Vec::with_capacity(items.len());
    for mut item in items {
        info!(target: "tools::news", url = %item.url, "redacting");
        let user = format!(
            "### {}\n- **Date:** {}\n- **Language:** {}\n- **Source:** [{}]\n- **Url:** ({})\n",
            item.title,
            item.date.format(DATE_FORMAT),
            item.language.as_deref().unwrap_or("-"),
            item.source.as_ref().map(|s| s.name.as_str()).unwrap_or("-"),
            item.url
        );
        let answer = ctx.respond_text(Capability::Find, &system, &user).await?;
        match redaction_of(&answer) {
            Extraction::Value(markdown) => {
                item.body = Some(NewsBody::Article { markdown });
                out.push(item);
            }
            Extraction::Discarded => {
                info!(target: "tools::news", url = %item.url, "discarded as irrelevant or duplicated");
                counter!("news_discarded_total", "stage" => "redact").increment(1);
            }
            Extraction::Empty => {
                warn!(target: "tools::news", url = %item.url, "empty redaction, discarding");
                counter!("news_discarded_total", "stage" => "redact").increment(1);
            }
        }
    }
    Ok(out)
}

/// Classify a redaction answer.
pub fn redaction_of(answer: &str) -> Extraction<String> {
    if is_none_literal(answer) {
        return Extraction::Discarded;
    }
    let markdown = unwrap_markdown(answer);
    if markdown.is_empty() {
        Extraction::Empty
    } else {
        Extraction::Value(markdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn window_is_inclusive() {
        let w = DateWindow::ending(d(2024, 6, 8), 7);
        assert!(w.contains(d(2024, 6, 1)));
        assert!(w.contains(d(2024, 6, 8)));
        assert!(!w.contains(d(2024, 5, 31)));
        assert!(!w.contains(d(2024, 6, 9)));
    }

    #[test]
    fn oversized_window_starts_at_the_earliest_date() {
        let w = DateWindow::ending(d(2024, 6, 8), i64::MAX);
        assert!(w.contains(NaiveDate::MIN));
        assert!(w.contains(d(2024, 6, 8)));
    }

    #[test]
    fn summary_shapes() {
        let obj = json!({"summary": {"introduction": "Intro", "content": "Body"}});
        assert!(parse_summary(&obj).is_value());
        let legacy = json!([{"sumary": {"introduction": "Intro", "content": "Body"}}]);
        assert!(parse_summary(&legacy).is_value());
        let empty = json!({"summary": {"introduction": "", "content": "Body"}});
        assert_eq!(parse_summary(&empty), Extraction::Empty);
        assert_eq!(parse_summary(&json!({})), Extraction::Empty);
    }

    #[test]
    fn redaction_classes() {
        assert_eq!(redaction_of("None"), Extraction::Discarded);
        assert_eq!(redaction_of("```\nnone\n```"), Extraction::Discarded);
        assert_eq!(
            redaction_of("```markdown\n# Rust 1.80\n\nText\n```"),
            Extraction::Value("# Rust 1.80\n\nText".into())
        );
        assert_eq!(redaction_of("   "), Extraction::Empty);
    }

    #[test]
    fn headlines_outside_window_are_dropped() {
        let w = DateWindow::ending(d(2024, 6, 8), 7);
        let ok = RawHeadline {
            title: "Go 1.23".into(),
            url: "https://go.dev/blog/go1.23".into(),
            date: "2024-06-05".into(),
            language: None,
            source: None,
        };
        let old = RawHeadline {
            date: "2024-05-01".into(),
            ..ok.clone()
        };
        let bad = RawHeadline {
            date: "June 5".into(),
            ..ok.clone()
        };
        assert!(to_item(&ok, &w, None).is_some());
        assert!(to_item(&old, &w, None).is_none());
        assert!(to_item(&bad, &w, None).is_none());
    }
}
