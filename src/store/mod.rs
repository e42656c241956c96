//! Persistence seam for repositories, posts, news and news sources.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{NewsSource, PostArtifact, RepositoryRecord, StoredNews};

pub use memory::MemoryStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
    #[default]
    Id,
    Name,
    CreatedAt,
    UpdatedAt,
    Stars,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

/// Strict comparison against a score threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreComparison {
    Greater,
    Less,
}

impl ScoreComparison {
    pub fn matches(self, score: f64, threshold: f64) -> bool {
        match self {
            ScoreComparison::Greater => score > threshold,
            ScoreComparison::Less => score < threshold,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_repo(&self, id: i64) -> Result<RepositoryRecord, StoreError>;
    async fn list_repos(
        &self,
        order_by: OrderField,
        direction: OrderDirection,
    ) -> Result<Vec<RepositoryRecord>, StoreError>;
    async fn create_repo(&self, repo: RepositoryRecord) -> Result<RepositoryRecord, StoreError>;
    /// Replaces the record; `updated_at` never moves backwards.
    async fn update_repo(&self, repo: RepositoryRecord) -> Result<RepositoryRecord, StoreError>;
    async fn delete_repo(&self, id: i64) -> Result<(), StoreError>;

    async fn get_post(&self, id: i64) -> Result<PostArtifact, StoreError>;
    async fn list_posts(
        &self,
        order_by: OrderField,
        direction: OrderDirection,
    ) -> Result<Vec<PostArtifact>, StoreError>;
    async fn create_post(&self, post: PostArtifact) -> Result<PostArtifact, StoreError>;
    async fn update_post(&self, post: PostArtifact) -> Result<PostArtifact, StoreError>;

    async fn list_news_sources(&self) -> Result<Vec<NewsSource>, StoreError>;
    async fn list_news_sources_by_score(
        &self,
        threshold: f64,
        comparison: ScoreComparison,
    ) -> Result<Vec<NewsSource>, StoreError>;
    async fn get_news_source_by_name(&self, name: &str) -> Result<Option<NewsSource>, StoreError>;
    /// Assigns the id; name, url and rss are unique.
    async fn create_news_source(&self, source: NewsSource) -> Result<NewsSource, StoreError>;
    async fn update_news_source(&self, source: NewsSource) -> Result<NewsSource, StoreError>;

    async fn get_news_by_url(&self, url: &str) -> Result<Option<StoredNews>, StoreError>;
    /// Assigns the id; url is unique.
    async fn create_news(&self, news: StoredNews) -> Result<StoredNews, StoreError>;
    async fn list_news(&self) -> Result<Vec<StoredNews>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparisons_are_strict() {
        assert!(ScoreComparison::Greater.matches(0.1, 0.0));
        assert!(!ScoreComparison::Greater.matches(0.0, 0.0));
        assert!(ScoreComparison::Less.matches(-0.5, 0.0));
        assert!(!ScoreComparison::Less.matches(0.0, 0.0));
    }

    #[test]
    fn order_params_parse_from_query_strings() {
        let f: OrderField = serde_json::from_str("\"updated_at\"").unwrap();
        assert_eq!(f, OrderField::UpdatedAt);
        let d: OrderDirection = serde_json::from_str("\"asc\"").unwrap();
        assert_eq!(d, OrderDirection::Asc);
    }
}
