// src/lib.rs
// Public library surface for the binary and the integration tests.

pub mod api;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod github;
pub mod json_extract;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod rebuild;
pub mod scheduler;
pub mod store;
pub mod tools;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use axum::Router;
use tracing::info;

pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::context::Context;
pub use crate::pipeline::{Orchestrator, Pipeline, PipelineOutput};

use crate::clock::SystemClock;
use crate::fetch::ReqwestFetch;
use crate::github::GithubClient;
use crate::llm::{BatchRunner, OpenAiClient, RetryPolicy, RetryingClient};
use crate::rebuild::RebuildHook;
use crate::store::{MemoryStore, Store};

/// Wire the production collaborators from `cfg` and return the full router
/// (API + `/metrics`). Spawns the update scheduler when it is enabled.
pub async fn app(cfg: AppConfig) -> anyhow::Result<Router> {
    let metrics = metrics::Metrics::init()?;

    let openai = Arc::new(OpenAiClient::new(&cfg.openai, &cfg.models).context("building OpenAI client")?);
    let llm = Arc::new(RetryingClient::new(openai.clone(), RetryPolicy::from(&cfg.retry)));

    let http = Arc::new(
        ReqwestFetch::new(
            Duration::from_secs(cfg.openai.connect_timeout_secs),
            Duration::from_secs(30),
        )
        .context("building HTTP fetcher")?,
    );

    let store: Arc<dyn Store> = match &cfg.store.snapshot_path {
        Some(path) => Arc::new(MemoryStore::open(path).context("opening store snapshot")?),
        None => Arc::new(MemoryStore::new()),
    };

    let github = Arc::new(GithubClient::new(&cfg.github).context("building GitHub client")?);

    let rebuild = cfg.server.rebuild_hook_url.as_deref().map(|url| {
        RebuildHook::new(url, http.clone()).with_attempts(cfg.server.rebuild_attempts)
    });

    let batch = Arc::new(
        BatchRunner::new(
            openai,
            Duration::from_secs(cfg.batch.poll_interval_secs),
            Duration::from_secs(cfg.batch.max_wait_secs),
        )
        .with_completion_window(cfg.batch.completion_window.clone()),
    );

    let scheduler = cfg.scheduler.clone();
    let ctx = Context::new(cfg, llm, http, store, Arc::new(SystemClock)).with_batch(batch);
    let orch = Orchestrator::new(ctx);

    if scheduler.enabled {
        let every = Duration::from_secs(scheduler.interval_secs());
        info!(every_secs = every.as_secs(), "update scheduler enabled");
        scheduler::spawn_update_scheduler(orch.clone(), rebuild.clone(), every);
    }

    let mut state = AppState::new(orch, github);
    if let Some(hook) = rebuild {
        state = state.with_rebuild(hook);
    }

    Ok(router(state).merge(metrics.router()))
}
