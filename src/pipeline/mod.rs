//! Mode-dispatched orchestrator composing the content tools.
//!
//! | mode | flow |
//! |------|------|
//! | `EVAL` | recency check on `updated_at`, then `POST` or `Skipped` |
//! | `POST` | README, analyze, outline, write, polish |
//! | `NEWS` | sites, headlines, cleanup, sort, redact |
//! | `SRCS` | discovery when short of sources, then extract and summarize |
//! | `TEST` | extract and summarize without discovery or score writes |

pub mod posts;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::context::Context;
use crate::error::{PipelineError, Result};
use crate::model::{NewsItem, RepositoryRecord, StoredNews};
use crate::store::ScoreComparison;
use crate::tools::{news, post, sources};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Pipeline {
    Test,
    Eval,
    Post,
    News,
    Srcs,
}

impl Pipeline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pipeline::Test => "TEST",
            Pipeline::Eval => "EVAL",
            Pipeline::Post => "POST",
            Pipeline::News => "NEWS",
            Pipeline::Srcs => "SRCS",
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pipeline {
    type Err = PipelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TEST" => Ok(Pipeline::Test),
            "EVAL" => Ok(Pipeline::Eval),
            "POST" => Ok(Pipeline::Post),
            "NEWS" => Ok(Pipeline::News),
            "SRCS" => Ok(Pipeline::Srcs),
            other => Err(PipelineError::InvalidPayload(format!("unknown pipeline mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutput {
    Article(String),
    News(Vec<NewsItem>),
    /// EVAL found nothing recent enough to regenerate.
    Skipped,
}

/// Runs one mode per call; holds no state between runs.
#[derive(Clone)]
pub struct Orchestrator {
    ctx: Context,
}

impl Orchestrator {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub async fn run(&self, mode: Pipeline, payload: &Value) -> Result<PipelineOutput> {
        info!(target: "pipeline", mode = %mode, "running pipeline");
        counter!("pipeline_runs_total", "mode" => mode.as_str()).increment(1);

        let out = match mode {
            Pipeline::Eval => {
                let repo = RepositoryRecord::from_payload(payload)?;
                self.run_eval(&repo).await
            }
            Pipeline::Post => {
                let repo = RepositoryRecord::from_payload(payload)?;
                self.run_post(&repo).await.map(PipelineOutput::Article)
            }
            Pipeline::News => self.run_news().await.map(PipelineOutput::News),
            Pipeline::Srcs => self.run_sources(false).await.map(PipelineOutput::News),
            Pipeline::Test => self.run_sources(true).await.map(PipelineOutput::News),
        };

        if let Err(e) = &out {
            counter!("pipeline_failures_total", "mode" => mode.as_str()).increment(1);
            warn!(target: "pipeline", mode = %mode, error = %e, "pipeline failed");
        }
        out
    }

    /// True when `updated_at` falls inside the recency window (boundary included).
    /// A window reaching past the representable range counts everything as recent.
    pub fn is_recent(&self, updated_at: DateTime<Utc>) -> bool {
        let cutoff = Duration::try_days(self.ctx.pipeline().recency_days)
            .and_then(|window| self.ctx.clock.now().checked_sub_signed(window));
        cutoff.map_or(true, |cutoff| updated_at >= cutoff)
    }

    pub async fn run_eval(&self, repo: &RepositoryRecord) -> Result<PipelineOutput> {
        if !self.is_recent(repo.updated_at) {
            info!(target: "pipeline", repo = %repo.name, "no recent changes, post left as is");
            return Ok(PipelineOutput::Skipped);
        }
        info!(target: "pipeline", repo = %repo.name, "repository updated recently, regenerating");
        self.run_post(repo).await.map(PipelineOutput::Article)
    }

    pub async fn run_post(&self, repo: &RepositoryRecord) -> Result<String> {
        let ctx = &self.ctx;
        let readme = post::fetch_readme(ctx, repo).await?;
        let analysis = post::analyze_repo(ctx, repo, &readme).await?;
        let outline = post::generate_outline(ctx, &analysis).await?;
        let draft = post::write_post(ctx, &outline, repo, &readme).await?;
        let article = post::polish_markdown(ctx, &draft).await?;
        if article.trim().is_empty() {
            return Err(PipelineError::Llm(crate::error::LlmError::InvalidResponse(
                "polished article is empty".into(),
            )));
        }
        info!(target: "pipeline", repo = %repo.name, chars = article.chars().count(), "post generated");
        Ok(article)
    }

    pub async fn run_news(&self) -> Result<Vec<NewsItem>> {
        let ctx = &self.ctx;
        let vetoed: Vec<String> = ctx
            .store
            .list_news_sources()
            .await?
            .into_iter()
            .filter(|s| !s.is_available() || s.score <= ctx.pipeline().veto_score)
            .map(|s| s.url)
            .collect();

        let sites = news::discover_news_sites(ctx, &vetoed).await?;
        let collected = news::collect_headlines(ctx, &sites).await;
        let mut cleaned = news::cleanup_news(ctx, &collected).await?;
        news::sort_by_date(&mut cleaned);
        let before = cleaned.len();
        let redacted = news::redact_news(ctx, cleaned).await?;
        info!(
            target: "pipeline",
            redacted = redacted.len(),
            discarded = before - redacted.len(),
            "news chain finished"
        );
        Ok(redacted)
    }

    /// SRCS (`dry_run == false`) and TEST (`dry_run == true`).
    pub async fn run_sources(&self, dry_run: bool) -> Result<Vec<NewsItem>> {
        let ctx = &self.ctx;
        let cfg = ctx.pipeline();
        let threshold = cfg.source_score_threshold;

        let mut qualifying = ctx
            .store
            .list_news_sources_by_score(threshold, ScoreComparison::Greater)
            .await?;

        if !dry_run && qualifying.len() < cfg.min_sources {
            info!(
                target: "pipeline",
                have = qualifying.len(),
                want = cfg.min_sources,
                "too few sources, running discovery"
            );
            let all = ctx.store.list_news_sources().await?;
            let found = sources::discover_sources(ctx, &all).await?;
            let candidates = sources::normalize_rss(ctx, &found).await?;
            sources::validate_sources(ctx, &candidates).await?;
            qualifying = ctx
                .store
                .list_news_sources_by_score(threshold, ScoreComparison::Greater)
                .await?;
        }

        let qualifying: Vec<_> = qualifying.into_iter().filter(|s| s.is_available()).collect();
        let items = news::extract_weekly_news(ctx, &qualifying, !dry_run).await?;
        news::summarize_news(ctx, items).await
    }

    /// Store generated news; rows whose url is already present are skipped.
    pub async fn persist_news(&self, items: &[NewsItem]) -> Result<Vec<StoredNews>> {
        let now = self.ctx.clock.now();
        let mut saved = Vec::new();
        for item in items {
            let Some(row) = StoredNews::from_item(item, now) else {
                continue;
            };
            match self.ctx.store.create_news(row).await {
                Ok(stored) => saved.push(stored),
                Err(e) if e.is_already_exists() => {
                    warn!(target: "pipeline", url = %item.url, "news already stored");
                }
                Err(e) => return Err(e.into()),
            }
        }
        counter!("news_saved_total").increment(saved.len() as u64);
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!("srcs".parse::<Pipeline>().unwrap(), Pipeline::Srcs);
        assert_eq!(" Eval".parse::<Pipeline>().unwrap(), Pipeline::Eval);
        assert!("SHIP".parse::<Pipeline>().is_err());
        assert_eq!(Pipeline::News.to_string(), "NEWS");
    }
}
