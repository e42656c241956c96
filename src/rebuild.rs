// src/rebuild.rs
//! Site rebuild trigger fired after posts change.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use metrics::counter;
use serde_json::json;

use crate::fetch::HttpFetch;
use crate::pipeline::posts::UpdateReport;

#[derive(Clone)]
pub struct RebuildHook {
    url: String,
    http: Arc<dyn HttpFetch>,
    max_attempts: u32,
    base_delay: Duration,
}

impl RebuildHook {
    pub fn new(url: impl Into<String>, http: Arc<dyn HttpFetch>) -> Self {
        Self {
            url: url.into(),
            http,
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST the update summary to the hook, retrying with doubling delays.
    pub async fn trigger(&self, report: &UpdateReport) -> Result<()> {
        let body = json!({
            "event": "posts_updated",
            "regenerated": report.regenerated,
            "evaluated": report.evaluated,
        });

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.http.post_json(&self.url, &body).await {
                Ok(status) if (200..300).contains(&status) => {
                    counter!("rebuild_triggers_total", "outcome" => "ok").increment(1);
                    tracing::info!(target: "rebuild", attempt, "rebuild hook accepted");
                    return Ok(());
                }
                Ok(status) => anyhow!("rebuild hook returned HTTP {status}"),
                Err(e) => anyhow!("rebuild hook request failed: {e}"),
            };

            if attempt < self.max_attempts {
                tracing::warn!(target: "rebuild", attempt, error = %err, "retrying rebuild hook");
                tokio::time::sleep(self.base_delay * (1u32 << (attempt - 1))).await;
                continue;
            }
            counter!("rebuild_triggers_total", "outcome" => "error").increment(1);
            return Err(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MockFetch;

    fn report() -> UpdateReport {
        UpdateReport {
            evaluated: 3,
            regenerated: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn retries_until_accepted() {
        let fetch = Arc::new(MockFetch::new().post_responses(&[503, 500]));
        let hook = RebuildHook::new("https://hook.test/build", fetch.clone())
            .with_base_delay(Duration::from_millis(1));

        hook.trigger(&report()).await.unwrap();

        let posted = fetch.posted();
        assert_eq!(posted.len(), 3);
        assert_eq!(posted[0].0, "https://hook.test/build");
        assert_eq!(posted[0].1["regenerated"], 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let fetch = Arc::new(MockFetch::new().post_responses(&[500, 500, 500]));
        let hook = RebuildHook::new("https://hook.test/build", fetch.clone())
            .with_attempts(2)
            .with_base_delay(Duration::from_millis(1));

        let err = hook.trigger(&report()).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
        assert_eq!(fetch.posted().len(), 2);
    }
}
