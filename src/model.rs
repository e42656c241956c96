//! Domain types shared by the pipeline, the store and the HTTP layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Sentinel stored in `NewsSource::rss` for feeds that failed validation.
pub const RSS_UNAVAILABLE: &str = "unavailable";

/// Lowest score a source can hold; also the "not usable" sentinel.
pub const SCORE_MIN: f64 = -1.0;
pub const SCORE_MAX: f64 = 1.0;

/// Repository metadata as produced by the GitHub fetcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub stars: u32,
    #[serde(default)]
    pub forks: u32,
    #[serde(default)]
    pub watchers: u32,
    #[serde(default)]
    pub views: u32,
    #[serde(default)]
    pub unique_views: u32,
    #[serde(default)]
    pub clones: u32,
    #[serde(default)]
    pub unique_clones: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RepositoryRecord {
    /// Build a record from an untyped JSON payload (HTTP boundary).
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, PipelineError> {
        let repo: RepositoryRecord = serde_json::from_value(payload.clone())
            .map_err(|e| PipelineError::InvalidPayload(e.to_string()))?;
        repo.validate()?;
        Ok(repo)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::InvalidPayload("repository name is empty".into()));
        }
        if self.url.trim().is_empty() {
            return Err(PipelineError::InvalidPayload("repository url is empty".into()));
        }
        if self.updated_at < self.created_at {
            return Err(PipelineError::InvalidPayload(format!(
                "repository {} updated_at precedes created_at",
                self.name
            )));
        }
        Ok(())
    }

    /// `owner/repo` taken from the last two path segments of the url.
    pub fn owner_repo(&self) -> Option<String> {
        let trimmed = self.url.trim().trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
        let mut parts = trimmed.rsplit('/').filter(|p| !p.is_empty());
        let repo = parts.next()?;
        let owner = parts.next()?;
        if owner.contains(':') {
            return None;
        }
        Some(format!("{owner}/{repo}"))
    }
}

/// Generated article for one repository (shares the repository id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostArtifact {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub article: String,
}

impl PostArtifact {
    pub fn from_article(repo: &RepositoryRecord, article: String, now: DateTime<Utc>) -> Self {
        let title = first_heading(&article).unwrap_or_else(|| repo.name.clone());
        let description = repo
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Notes on {}", repo.name));
        Self {
            id: repo.id,
            title,
            description,
            created_at: now,
            updated_at: now,
            article,
        }
    }
}

fn first_heading(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// A tracked RSS/Atom feed with a quality score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsSource {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub url: String,
    pub rss: String,
    pub added_at: DateTime<Utc>,
    pub score: f64,
}

impl NewsSource {
    pub fn is_available(&self) -> bool {
        self.rss != RSS_UNAVAILABLE && !self.rss.trim().is_empty()
    }

    pub fn reference(&self) -> SourceRef {
        SourceRef {
            name: self.name.clone(),
            url: self.url.clone(),
            rss: self.rss.clone(),
        }
    }
}

pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(SCORE_MIN, SCORE_MAX)
}

/// Source a news item was extracted from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub rss: String,
}

/// Generated text attached to a news item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NewsBody {
    Summary {
        introduction: String,
        content: String,
    },
    /// Single markdown article produced by the legacy redaction chain.
    Article { markdown: String },
}

/// Transient news record flowing through extraction and summarization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub source: Option<SourceRef>,
    #[serde(default)]
    pub body: Option<NewsBody>,
}

/// Persisted news row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredNews {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    pub url: String,
    pub date: NaiveDate,
    pub source: String,
    #[serde(default)]
    pub language: Option<String>,
    pub introduction: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StoredNews {
    /// `None` for items that never got a body.
    pub fn from_item(item: &NewsItem, now: DateTime<Utc>) -> Option<Self> {
        let (introduction, content) = match item.body.as_ref()? {
            NewsBody::Summary {
                introduction,
                content,
            } => (introduction.clone(), content.clone()),
            NewsBody::Article { markdown } => (String::new(), markdown.clone()),
        };
        Some(Self {
            id: 0,
            title: item.title.clone(),
            url: item.url.clone(),
            date: item.date,
            source: item
                .source
                .as_ref()
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            language: item.language.clone(),
            introduction,
            content,
            created_at: now,
        })
    }
}

/// Candidate feed produced by RSS normalization, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCandidate {
    pub name: String,
    pub url: String,
    pub rss: String,
}
