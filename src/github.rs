// src/github.rs
//! GitHub REST metadata fetcher (repositories + traffic counters).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::GithubConfig;
use crate::error::GithubError;
use crate::model::RepositoryRecord;

/// Account whose repositories are listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    User(String),
    Org(String),
}

impl Owner {
    pub fn login(&self) -> &str {
        match self {
            Owner::User(l) | Owner::Org(l) => l,
        }
    }

    fn path_segment(&self) -> &'static str {
        match self {
            Owner::User(_) => "users",
            Owner::Org(_) => "orgs",
        }
    }
}

#[async_trait]
pub trait RepoFetcher: Send + Sync {
    async fn fetch_repositories(&self, owner: &Owner) -> Result<Vec<RepositoryRecord>, GithubError>;
    async fn list_organizations(&self, user: &str) -> Result<Vec<String>, GithubError>;
}

#[derive(Debug, Deserialize)]
struct GhRepo {
    id: i64,
    name: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    html_url: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    stargazers_count: u32,
    #[serde(default)]
    forks_count: u32,
    #[serde(default)]
    watchers_count: u32,
    created_at: DateTime<Utc>,
    #[serde(default)]
    pushed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
struct Traffic {
    #[serde(default)]
    count: u32,
    #[serde(default)]
    uniques: u32,
}

#[derive(Debug, Deserialize)]
struct GhOrg {
    login: String,
}

fn to_record(repo: GhRepo, views: Traffic, clones: Traffic) -> RepositoryRecord {
    // Last push is what marks content changes; metadata edits bump updated_at too.
    let updated_at = repo.pushed_at.unwrap_or(repo.updated_at).max(repo.created_at);
    RepositoryRecord {
        id: repo.id,
        name: repo.name,
        description: repo.description.filter(|d| !d.trim().is_empty()),
        url: repo.html_url,
        language: repo.language,
        stars: repo.stargazers_count,
        forks: repo.forks_count,
        watchers: repo.watchers_count,
        views: views.count,
        unique_views: views.uniques,
        clones: clones.count,
        unique_clones: clones.uniques,
        created_at: repo.created_at,
        updated_at,
    }
}

pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl GithubClient {
    pub fn new(cfg: &GithubConfig) -> Result<Self, GithubError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("techpress/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self
            .http
            .get(format!("{}/{}", self.api_base, path.trim_start_matches('/')))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if self.token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.token)
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, GithubError> {
        let resp = self.get(path).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GithubError::Status {
                status: status.as_u16(),
                url: path.to_string(),
            });
        }
        Ok(resp.json().await?)
    }

    /// Traffic needs push access; anything but 200 counts as zero.
    async fn traffic(&self, full_name: &str, kind: &str) -> Traffic {
        match self
            .get_json::<Traffic>(&format!("repos/{full_name}/traffic/{kind}"))
            .await
        {
            Ok(t) => t,
            Err(e) => {
                warn!(target: "github", repo = full_name, kind, error = %e, "traffic unavailable");
                Traffic::default()
            }
        }
    }
}

#[async_trait]
impl RepoFetcher for GithubClient {
    async fn fetch_repositories(&self, owner: &Owner) -> Result<Vec<RepositoryRecord>, GithubError> {
        let path = format!(
            "{}/{}/repos?per_page=100",
            owner.path_segment(),
            owner.login()
        );
        let repos: Vec<GhRepo> = self.get_json(&path).await?;

        let mut out = Vec::with_capacity(repos.len());
        for repo in repos {
            if matches!(owner, Owner::Org(_)) && repo.name.starts_with('.') {
                continue;
            }
            let full_name = repo
                .full_name
                .clone()
                .unwrap_or_else(|| format!("{}/{}", owner.login(), repo.name));
            let views = self.traffic(&full_name, "views").await;
            let clones = self.traffic(&full_name, "clones").await;
            out.push(to_record(repo, views, clones));
        }
        info!(target: "github", owner = owner.login(), repos = out.len(), "repositories fetched");
        Ok(out)
    }

    async fn list_organizations(&self, user: &str) -> Result<Vec<String>, GithubError> {
        let orgs: Vec<GhOrg> = self.get_json(&format!("users/{user}/orgs")).await?;
        Ok(orgs.into_iter().map(|o| o.login).collect())
    }
}

/// Canned fetcher for tests and offline runs.
#[derive(Default)]
pub struct MockRepoFetcher {
    repos: Mutex<Vec<(Owner, RepositoryRecord)>>,
    orgs: Vec<String>,
}

impl MockRepoFetcher {
    pub fn new(orgs: Vec<String>) -> Self {
        Self {
            repos: Mutex::new(Vec::new()),
            orgs,
        }
    }

    pub fn with_repo(self, owner: Owner, repo: RepositoryRecord) -> Self {
        self.repos.lock().push((owner, repo));
        self
    }
}

#[async_trait]
impl RepoFetcher for MockRepoFetcher {
    async fn fetch_repositories(&self, owner: &Owner) -> Result<Vec<RepositoryRecord>, GithubError> {
        Ok(self
            .repos
            .lock()
            .iter()
            .filter(|(o, _)| o == owner)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn list_organizations(&self, _user: &str) -> Result<Vec<String>, GithubError> {
        Ok(self.orgs.clone())
    }
}
