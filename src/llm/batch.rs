//! Asynchronous batch path: many prompts in one uploaded job file.
//!
//! The runner serializes one JSONL line per prompt, submits the batch,
//! polls until a terminal state or the maximum wait, and parses per-request
//! results keyed by their index. One failed request never fails the batch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::LlmError;

use super::{CapabilityProfile, Response, ResponseRequest};

const RESPONSES_ENDPOINT: &str = "/v1/responses";
const CUSTOM_ID_PREFIX: &str = "request-";

/// Provider-side batch job as reported by the API.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BatchJob {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output_file_id: Option<String>,
    #[serde(default)]
    pub error_file_id: Option<String>,
}

impl BatchJob {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status.as_str(),
            "completed" | "failed" | "expired" | "cancelled"
        )
    }
}

/// File and batch endpoints used by [`BatchRunner`].
#[async_trait]
pub trait BatchApi: Send + Sync {
    /// Upload a JSONL job file; returns the file id.
    async fn upload_jsonl(&self, file_name: &str, body: String) -> Result<String, LlmError>;
    async fn create_batch(
        &self,
        input_file_id: &str,
        endpoint: &str,
        completion_window: &str,
    ) -> Result<BatchJob, LlmError>;
    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchJob, LlmError>;
    async fn file_content(&self, file_id: &str) -> Result<String, LlmError>;
}

/// Result of one request inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Ok(Response),
    Failed(String),
    /// The provider returned nothing for this index.
    Missing,
}

impl BatchOutcome {
    pub fn text(&self) -> Option<String> {
        match self {
            BatchOutcome::Ok(resp) => resp.first_message_text().ok(),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct JobLine<'a> {
    custom_id: String,
    method: &'static str,
    url: &'static str,
    body: &'a ResponseRequest,
}

#[derive(Deserialize)]
struct ResultLine {
    custom_id: String,
    #[serde(default)]
    response: Option<ResultResponse>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ResultResponse {
    status_code: u16,
    #[serde(default)]
    body: serde_json::Value,
}

pub struct BatchRunner {
    api: Arc<dyn BatchApi>,
    poll_interval: Duration,
    max_wait: Duration,
    completion_window: String,
}

impl BatchRunner {
    pub fn new(api: Arc<dyn BatchApi>, poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            api,
            poll_interval,
            max_wait,
            completion_window: "24h".to_string(),
        }
    }

    pub fn with_completion_window(mut self, window: impl Into<String>) -> Self {
        self.completion_window = window.into();
        self
    }

    /// Run `prompts` against `profile` with a shared system prompt.
    /// The returned vector is indexed like `prompts`.
    pub async fn run(
        &self,
        profile: &CapabilityProfile,
        system: &str,
        prompts: &[String],
    ) -> Result<Vec<BatchOutcome>, LlmError> {
        if prompts.is_empty() {
            return Ok(Vec::new());
        }

        let body = build_jsonl(profile, system, prompts)?;
        let file_id = self.api.upload_jsonl("techpress-batch.jsonl", body).await?;
        let job = self
            .api
            .create_batch(&file_id, RESPONSES_ENDPOINT, &self.completion_window)
            .await?;
        info!(target: "llm::batch", batch_id = %job.id, requests = prompts.len(), "batch submitted");
        counter!("llm_batches_total").increment(1);

        let job = self.wait(job).await?;
        if job.status != "completed" {
            return Err(LlmError::BatchFailed {
                batch_id: job.id,
                status: job.status,
            });
        }

        let mut outcomes = vec![BatchOutcome::Missing; prompts.len()];
        for file_id in [&job.output_file_id, &job.error_file_id].into_iter().flatten() {
            let content = self.api.file_content(file_id).await?;
            apply_results(&content, &mut outcomes);
        }

        let failed = outcomes
            .iter()
            .filter(|o| !matches!(o, BatchOutcome::Ok(_)))
            .count();
        if failed > 0 {
            warn!(target: "llm::batch", batch_id = %job.id, failed, "batch finished with failed requests");
        }
        Ok(outcomes)
    }

    async fn wait(&self, mut job: BatchJob) -> Result<BatchJob, LlmError> {
        let started = Instant::now();
        while !job.is_terminal() {
            let waited = started.elapsed();
            if waited >= self.max_wait {
                return Err(LlmError::BatchTimeout {
                    batch_id: job.id,
                    waited,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
            job = self.api.retrieve_batch(&job.id).await?;
            debug!(target: "llm::batch", batch_id = %job.id, status = %job.status, "batch polled");
        }
        Ok(job)
    }
}

fn build_jsonl(
    profile: &CapabilityProfile,
    system: &str,
    prompts: &[String],
) -> Result<String, LlmError> {
    let mut out = String::new();
    for (i, prompt) in prompts.iter().enumerate() {
        let request = profile.request(system, prompt);
        let line = JobLine {
            custom_id: format!("{CUSTOM_ID_PREFIX}{i}"),
            method: "POST",
            url: RESPONSES_ENDPOINT,
            body: &request,
        };
        let encoded =
            serde_json::to_string(&line).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        out.push_str(&encoded);
        out.push('\n');
    }
    Ok(out)
}

fn apply_results(content: &str, outcomes: &mut [BatchOutcome]) {
    let mut seen = HashSet::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let parsed: ResultLine = match serde_json::from_str(line) {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "llm::batch", error = %e, "unparseable batch result line");
                continue;
            }
        };
        let Some(index) = parsed
            .custom_id
            .strip_prefix(CUSTOM_ID_PREFIX)
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|i| *i < outcomes.len())
        else {
            warn!(target: "llm::batch", custom_id = %parsed.custom_id, "batch result for unknown request");
            continue;
        };
        if !seen.insert(index) {
            continue;
        }
        outcomes[index] = outcome_of(parsed);
    }
}

fn outcome_of(line: ResultLine) -> BatchOutcome {
    if let Some(err) = line.error.filter(|e| !e.is_null()) {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return BatchOutcome::Failed(message);
    }
    match line.response {
        Some(r) if r.status_code == 200 => match serde_json::from_value::<Response>(r.body) {
            Ok(resp) => BatchOutcome::Ok(resp),
            Err(e) => BatchOutcome::Failed(format!("invalid response body: {e}")),
        },
        Some(r) => {
            let message = r
                .body
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("request failed");
            BatchOutcome::Failed(format!("{}: {message}", r.status_code))
        }
        None => BatchOutcome::Failed("no response".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Capability, ProfileBuilder};

    #[test]
    fn jsonl_has_one_line_per_prompt() {
        let profile = ProfileBuilder::default().profile(Capability::Search);
        let prompts = vec!["a".to_string(), "b".to_string()];
        let body = build_jsonl(&profile, "sys", &prompts).unwrap();
        let lines: Vec<serde_json::Value> = body
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["custom_id"], "request-1");
        assert_eq!(lines[1]["url"], "/v1/responses");
        assert_eq!(lines[1]["body"]["model"], "o4-mini");
    }

    #[test]
    fn results_are_keyed_by_index() {
        let content = concat!(
            r#"{"custom_id":"request-1","response":{"status_code":200,"body":{"output":[{"type":"message","content":[{"type":"output_text","text":"two"}]}]}},"error":null}"#,
            "\n",
            r#"{"custom_id":"request-0","response":{"status_code":400,"body":{"error":{"message":"bad"}}},"error":null}"#,
            "\n",
            "not json\n",
        );
        let mut out = vec![BatchOutcome::Missing; 3];
        apply_results(content, &mut out);
        assert_eq!(out[0], BatchOutcome::Failed("400: bad".into()));
        assert_eq!(out[1].text().as_deref(), Some("two"));
        assert_eq!(out[2], BatchOutcome::Missing);
    }
}
