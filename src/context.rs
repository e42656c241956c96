//! Collaborators handed to every content tool and pipeline run.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::debug;

use crate::clock::Clock;
use crate::config::{AppConfig, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::fetch::HttpFetch;
use crate::llm::{BatchRunner, Capability, LlmClient, ProfileBuilder};
use crate::store::Store;

#[derive(Clone)]
pub struct Context {
    pub config: Arc<AppConfig>,
    pub llm: Arc<dyn LlmClient>,
    pub batch: Option<Arc<BatchRunner>>,
    pub http: Arc<dyn HttpFetch>,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub profiles: ProfileBuilder,
}

impl Context {
    pub fn new(
        config: AppConfig,
        llm: Arc<dyn LlmClient>,
        http: Arc<dyn HttpFetch>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let profiles =
            ProfileBuilder::new(config.models.clone(), config.openai.max_output_tokens);
        Self {
            config: Arc::new(config),
            llm,
            batch: None,
            http,
            store,
            clock,
            profiles,
        }
    }

    pub fn with_batch(mut self, runner: Arc<BatchRunner>) -> Self {
        self.batch = Some(runner);
        self
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.config.pipeline
    }

    /// Batch runner, when one is attached and batching is switched on.
    pub fn active_batch(&self) -> Option<&BatchRunner> {
        self.batch
            .as_deref()
            .filter(|_| self.config.batch.enabled)
    }

    /// Plain chat call.
    pub async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let t0 = Instant::now();
        let out = self.llm.chat(system, user).await;
        record_call("chat", t0, out.is_ok());
        Ok(out?)
    }

    /// Response call under `capability`, reduced to the first message text.
    pub async fn respond_text(
        &self,
        capability: Capability,
        system: &str,
        user: &str,
    ) -> Result<String> {
        let request = self.profiles.request(capability, system, user);
        debug!(target: "llm", capability = %capability, model = %request.model, "response call");
        let t0 = Instant::now();
        let out = self.llm.respond(&request).await;
        record_call(capability.as_str(), t0, out.is_ok());
        out?.first_message_text().map_err(PipelineError::from)
    }
}

fn record_call(capability: &'static str, started: Instant, ok: bool) {
    let ms = started.elapsed().as_secs_f64() * 1_000.0;
    histogram!("llm_call_ms", "capability" => capability).record(ms);
    counter!(
        "llm_calls_total",
        "capability" => capability,
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}
