// src/scheduler.rs
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::Result;
use crate::pipeline::posts::{update_all, UpdateReport};
use crate::pipeline::Orchestrator;
use crate::rebuild::RebuildHook;

/// update-all followed by the rebuild hook when any post changed.
/// A failing hook is logged; the report is still returned.
pub async fn update_and_rebuild(
    orch: &Orchestrator,
    hook: Option<&RebuildHook>,
) -> Result<UpdateReport> {
    let report = update_all(orch).await?;
    if let Some(hook) = hook.filter(|_| report.changed()) {
        if let Err(e) = hook.trigger(&report).await {
            tracing::warn!(target: "scheduler", error = ?e, url = hook.url(), "rebuild hook failed");
        }
    }
    Ok(report)
}

/// Spawn the periodic update-all job. The first run happens one full
/// interval after startup.
pub fn spawn_update_scheduler(
    orch: Orchestrator,
    hook: Option<RebuildHook>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = orch.context().clock.now().timestamp().max(0);

            match update_and_rebuild(&orch, hook.as_ref()).await {
                Ok(report) => {
                    counter!("scheduler_runs_total", "outcome" => "ok").increment(1);
                    tracing::info!(
                        target: "scheduler",
                        regenerated = report.regenerated,
                        skipped = report.skipped,
                        failed = report.failed,
                        "scheduled update tick"
                    );
                }
                Err(e) => {
                    counter!("scheduler_runs_total", "outcome" => "error").increment(1);
                    tracing::warn!(target: "scheduler", error = %e, "scheduled update failed");
                }
            }
            gauge!("scheduler_last_run_ts").set(now as f64);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::clock::FixedClock;
    use crate::config::AppConfig;
    use crate::context::Context;
    use crate::fetch::MockFetch;
    use crate::llm::MockLlm;
    use crate::model::RepositoryRecord;
    use crate::store::{MemoryStore, Store};

    fn orchestrator(fetch: Arc<MockFetch>) -> Orchestrator {
        let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
        let llm = MockLlm::with_handler(|_| Ok("# Widget\n\nA small tool.".to_string()));
        let ctx = Context::new(
            AppConfig::default(),
            Arc::new(llm),
            fetch,
            Arc::new(MemoryStore::new()),
            clock,
        );
        Orchestrator::new(ctx)
    }

    #[tokio::test]
    async fn unchanged_run_does_not_fire_hook() {
        let fetch = Arc::new(MockFetch::new());
        let orch = orchestrator(fetch.clone());

        let hook = RebuildHook::new("https://hook.test", fetch.clone());
        let report = update_and_rebuild(&orch, Some(&hook)).await.unwrap();
        assert_eq!(report, UpdateReport::default());
        assert!(fetch.posted().is_empty());
    }

    #[tokio::test]
    async fn regenerated_post_fires_hook() {
        let fetch = Arc::new(MockFetch::new());
        let orch = orchestrator(fetch.clone());
        let now = orch.context().clock.now();
        let repo: RepositoryRecord = serde_json::from_value(serde_json::json!({
            "id": 7,
            "name": "widget",
            "url": "https://github.com/acme/widget",
            "created_at": now - chrono::Duration::days(30),
            "updated_at": now - chrono::Duration::days(1),
        }))
        .unwrap();
        orch.context().store.create_repo(repo).await.unwrap();

        let hook = RebuildHook::new("https://hook.test", fetch.clone());
        let report = update_and_rebuild(&orch, Some(&hook)).await.unwrap();
        assert_eq!(report.regenerated, 1);
        assert_eq!(fetch.posted().len(), 1);
        assert!(orch.context().store.get_post(7).await.is_ok());
    }
}
