//! In-memory store with an optional JSON snapshot on disk.
//!
//! Every mutation rewrites the snapshot (temp file + rename) before the
//! in-memory tables change, so memory never runs ahead of the file.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::model::{NewsSource, PostArtifact, RepositoryRecord, StoredNews, RSS_UNAVAILABLE};

use super::{OrderDirection, OrderField, ScoreComparison, Store};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    repos: BTreeMap<i64, RepositoryRecord>,
    #[serde(default)]
    posts: BTreeMap<i64, PostArtifact>,
    #[serde(default)]
    sources: BTreeMap<i64, NewsSource>,
    #[serde(default)]
    news: BTreeMap<i64, StoredNews>,
}

impl Tables {
    fn next_source_id(&self) -> i64 {
        self.sources.keys().next_back().copied().unwrap_or(0) + 1
    }

    fn next_news_id(&self) -> i64 {
        self.news.keys().next_back().copied().unwrap_or(0) + 1
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    /// Serialises mutations so copy-then-swap never loses a concurrent write.
    writer: tokio::sync::Mutex<()>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a snapshot-backed store; a missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let tables = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let t: Tables = serde_json::from_str(&raw)?;
            info!(
                target: "store",
                path = %path.display(),
                repos = t.repos.len(),
                sources = t.sources.len(),
                "snapshot loaded"
            );
            t
        } else {
            Tables::default()
        };
        Ok(Self {
            tables: RwLock::new(tables),
            writer: tokio::sync::Mutex::new(()),
            snapshot: Some(path),
        })
    }

    /// Apply `f` to a copy of the tables, write the snapshot, then swap the
    /// copy in. A failed snapshot write leaves the live tables untouched.
    async fn mutate<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send,
        F: FnOnce(&mut Tables) -> Result<T, StoreError> + Send,
    {
        let _writer = self.writer.lock().await;
        let mut next = self.tables.read().clone();
        let out = f(&mut next)?;

        if let Some(path) = self.snapshot.clone() {
            let bytes = serde_json::to_vec_pretty(&next)?;
            tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
                .await
                .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;
            debug!(target: "store", "snapshot written");
        }

        *self.tables.write() = next;
        Ok(out)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    fs::rename(tmp, path)?;
    Ok(())
}

fn not_found(entity: &'static str, key: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        key: key.to_string(),
    }
}

fn exists(entity: &'static str, key: impl ToString) -> StoreError {
    StoreError::AlreadyExists {
        entity,
        key: key.to_string(),
    }
}

fn sort_repos(repos: &mut [RepositoryRecord], order_by: OrderField, direction: OrderDirection) {
    repos.sort_by(|a, b| {
        let ord = match order_by {
            OrderField::Id => a.id.cmp(&b.id),
            OrderField::Name => a.name.cmp(&b.name),
            OrderField::CreatedAt => a.created_at.cmp(&b.created_at),
            OrderField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            OrderField::Stars => a.stars.cmp(&b.stars),
        };
        match direction {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        }
    });
}

fn sort_posts(posts: &mut [PostArtifact], order_by: OrderField, direction: OrderDirection) {
    posts.sort_by(|a, b| {
        let ord = match order_by {
            OrderField::Name => a.title.cmp(&b.title),
            OrderField::CreatedAt => a.created_at.cmp(&b.created_at),
            OrderField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            OrderField::Id | OrderField::Stars => a.id.cmp(&b.id),
        };
        match direction {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        }
    });
}

/// rss values compared for uniqueness; the sentinel may repeat.
fn rss_collides(a: &str, b: &str) -> bool {
    a != RSS_UNAVAILABLE && a == b
}

fn check_source_unique(tables: &Tables, source: &NewsSource) -> Result<(), StoreError> {
    for other in tables.sources.values().filter(|s| s.id != source.id) {
        if other.name == source.name {
            return Err(exists("news source", &source.name));
        }
        if other.url == source.url {
            return Err(exists("news source", &source.url));
        }
        if rss_collides(&source.rss, &other.rss) {
            return Err(exists("news source", &source.rss));
        }
    }
    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_repo(&self, id: i64) -> Result<RepositoryRecord, StoreError> {
        self.tables
            .read()
            .repos
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("repository", id))
    }

    async fn list_repos(
        &self,
        order_by: OrderField,
        direction: OrderDirection,
    ) -> Result<Vec<RepositoryRecord>, StoreError> {
        let mut repos: Vec<_> = self.tables.read().repos.values().cloned().collect();
        sort_repos(&mut repos, order_by, direction);
        Ok(repos)
    }

    async fn create_repo(&self, repo: RepositoryRecord) -> Result<RepositoryRecord, StoreError> {
        self.mutate(|t| {
            if t.repos.contains_key(&repo.id) {
                return Err(exists("repository", repo.id));
            }
            if t.repos.values().any(|r| r.name == repo.name) {
                return Err(exists("repository", &repo.name));
            }
            t.repos.insert(repo.id, repo.clone());
            Ok(repo)
        })
        .await
    }

    async fn update_repo(&self, mut repo: RepositoryRecord) -> Result<RepositoryRecord, StoreError> {
        self.mutate(|t| {
            let current = t.repos.get(&repo.id).ok_or_else(|| not_found("repository", repo.id))?;
            if t.repos.values().any(|r| r.id != repo.id && r.name == repo.name) {
                return Err(exists("repository", &repo.name));
            }
            if repo.updated_at < current.updated_at {
                repo.updated_at = current.updated_at;
            }
            t.repos.insert(repo.id, repo.clone());
            Ok(repo)
        })
        .await
    }

    async fn delete_repo(&self, id: i64) -> Result<(), StoreError> {
        self.mutate(|t| {
            t.repos
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| not_found("repository", id))
        })
        .await
    }

    async fn get_post(&self, id: i64) -> Result<PostArtifact, StoreError> {
        self.tables
            .read()
            .posts
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("post", id))
    }

    async fn list_posts(
        &self,
        order_by: OrderField,
        direction: OrderDirection,
    ) -> Result<Vec<PostArtifact>, StoreError> {
        let mut posts: Vec<_> = self.tables.read().posts.values().cloned().collect();
        sort_posts(&mut posts, order_by, direction);
        Ok(posts)
    }

    async fn create_post(&self, post: PostArtifact) -> Result<PostArtifact, StoreError> {
        self.mutate(|t| {
            if t.posts.contains_key(&post.id) {
                return Err(exists("post", post.id));
            }
            t.posts.insert(post.id, post.clone());
            Ok(post)
        })
        .await
    }

    async fn update_post(&self, mut post: PostArtifact) -> Result<PostArtifact, StoreError> {
        self.mutate(|t| {
            let current = t.posts.get(&post.id).ok_or_else(|| not_found("post", post.id))?;
            post.created_at = current.created_at;
            t.posts.insert(post.id, post.clone());
            Ok(post)
        })
        .await
    }

    async fn list_news_sources(&self) -> Result<Vec<NewsSource>, StoreError> {
        Ok(self.tables.read().sources.values().cloned().collect())
    }

    async fn list_news_sources_by_score(
        &self,
        threshold: f64,
        comparison: ScoreComparison,
    ) -> Result<Vec<NewsSource>, StoreError> {
        Ok(self
            .tables
            .read()
            .sources
            .values()
            .filter(|s| comparison.matches(s.score, threshold))
            .cloned()
            .collect())
    }

    async fn get_news_source_by_name(&self, name: &str) -> Result<Option<NewsSource>, StoreError> {
        Ok(self
            .tables
            .read()
            .sources
            .values()
            .find(|s| s.name == name)
            .cloned())
    }

    async fn create_news_source(&self, mut source: NewsSource) -> Result<NewsSource, StoreError> {
        self.mutate(|t| {
            source.id = t.next_source_id();
            check_source_unique(t, &source)?;
            t.sources.insert(source.id, source.clone());
            Ok(source)
        })
        .await
    }

    async fn update_news_source(&self, source: NewsSource) -> Result<NewsSource, StoreError> {
        self.mutate(|t| {
            if !t.sources.contains_key(&source.id) {
                return Err(not_found("news source", source.id));
            }
            check_source_unique(t, &source)?;
            t.sources.insert(source.id, source.clone());
            Ok(source)
        })
        .await
    }

    async fn get_news_by_url(&self, url: &str) -> Result<Option<StoredNews>, StoreError> {
        Ok(self
            .tables
            .read()
            .news
            .values()
            .find(|n| n.url == url)
            .cloned())
    }

    async fn create_news(&self, mut news: StoredNews) -> Result<StoredNews, StoreError> {
        self.mutate(|t| {
            if t.news.values().any(|n| n.url == news.url) {
                return Err(exists("news", &news.url));
            }
            news.id = t.next_news_id();
            t.news.insert(news.id, news.clone());
            Ok(news)
        })
        .await
    }

    async fn list_news(&self) -> Result<Vec<StoredNews>, StoreError> {
        let mut news: Vec<_> = self.tables.read().news.values().cloned().collect();
        news.sort_by(|a, b| b.date.cmp(&a.date).then(a.id.cmp(&b.id)));
        Ok(news)
    }
}
