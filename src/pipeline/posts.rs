//! Post persistence around the POST and EVAL flows.

use metrics::{counter, gauge};
use serde::Serialize;
use tracing::{error, info};

use crate::error::Result;
use crate::model::{PostArtifact, RepositoryRecord};
use crate::store::{OrderDirection, OrderField};

use super::{Orchestrator, PipelineOutput};

/// Create the post for `repo`, or replace the article of the existing one.
pub async fn save_post(
    orch: &Orchestrator,
    repo: &RepositoryRecord,
    article: String,
) -> Result<PostArtifact> {
    let store = &orch.context().store;
    let now = orch.context().clock.now();
    let fresh = PostArtifact::from_article(repo, article, now);
    let saved = match store.get_post(repo.id).await {
        Ok(_) => store.update_post(fresh).await?,
        Err(crate::error::StoreError::NotFound { .. }) => store.create_post(fresh).await?,
        Err(e) => return Err(e.into()),
    };
    counter!("posts_saved_total").increment(1);
    Ok(saved)
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub evaluated: usize,
    pub regenerated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl UpdateReport {
    pub fn changed(&self) -> bool {
        self.regenerated > 0
    }
}

/// EVAL over every stored repository. A failing repository is logged and
/// counted; the run continues with the next one.
pub async fn update_all(orch: &Orchestrator) -> Result<UpdateReport> {
    let repos = orch
        .context()
        .store
        .list_repos(OrderField::Id, OrderDirection::Asc)
        .await?;

    let mut report = UpdateReport::default();
    for repo in &repos {
        report.evaluated += 1;
        match orch.run_eval(repo).await {
            Ok(PipelineOutput::Article(article)) => match save_post(orch, repo, article).await {
                Ok(_) => report.regenerated += 1,
                Err(e) => {
                    error!(target: "pipeline::posts", repo = %repo.name, error = %e, "saving post failed");
                    report.failed += 1;
                }
            },
            Ok(_) => report.skipped += 1,
            Err(e) => {
                error!(target: "pipeline::posts", repo = %repo.name, error = %e, "post update failed");
                report.failed += 1;
            }
        }
    }

    gauge!("posts_last_update_ts").set(orch.context().clock.now().timestamp() as f64);
    info!(
        target: "pipeline::posts",
        evaluated = report.evaluated,
        regenerated = report.regenerated,
        skipped = report.skipped,
        failed = report.failed,
        "update-all finished"
    );
    Ok(report)
}
