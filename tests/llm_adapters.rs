// tests/llm_adapters.rs
//
// Rate-limit retry wrapper and the batch runner against scripted providers.

mod common;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use techpress::config::AppConfig;
use techpress::error::LlmError;
use techpress::fetch::MockFetch;
use techpress::llm::{
    BatchApi, BatchJob, BatchOutcome, BatchRunner, Capability, LlmClient, MockLlm, ProfileBuilder,
    RetryPolicy, RetryingClient,
};
use techpress::model::NewsItem;
use techpress::tools::news::summarize_news;

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        jitter: 0.0,
    }
}

fn rate_limited() -> LlmError {
    LlmError::RateLimited {
        retry_after: Some(Duration::from_millis(2)),
    }
}

#[tokio::test]
async fn rate_limits_are_retried_until_success() {
    let mock = Arc::new(MockLlm::new());
    mock.push_error(rate_limited());
    mock.push_error(rate_limited());
    mock.push_reply("finally");
    let client = RetryingClient::new(mock.clone(), fast_policy(3));

    assert_eq!(client.chat("s", "u").await.unwrap(), "finally");
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test]
async fn retries_are_bounded() {
    let mock = Arc::new(MockLlm::new());
    for _ in 0..5 {
        mock.push_error(rate_limited());
    }
    let client = RetryingClient::new(mock.clone(), fast_policy(2));

    let req = ProfileBuilder::default().request(Capability::Chat, "s", "u");
    let err = client.respond(&req).await.unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test]
async fn other_errors_are_not_retried() {
    let mock = Arc::new(MockLlm::new());
    mock.push_error(LlmError::Provider {
        status: 500,
        message: "boom".into(),
    });
    mock.push_reply("unused");
    let client = RetryingClient::new(mock.clone(), fast_policy(3));

    assert!(matches!(
        client.chat("s", "u").await,
        Err(LlmError::Provider { status: 500, .. })
    ));
    assert_eq!(mock.call_count(), 1);
}

// ---------- batch ----------

#[derive(Default)]
struct ScriptedBatches {
    uploaded: Mutex<Vec<String>>,
    polls: Mutex<VecDeque<&'static str>>,
    final_status: &'static str,
    output: String,
}

impl ScriptedBatches {
    fn new(polls: &[&'static str], final_status: &'static str, output: String) -> Self {
        Self {
            polls: Mutex::new(polls.iter().copied().collect()),
            final_status,
            output,
            ..Default::default()
        }
    }

    fn job(&self, status: &str) -> BatchJob {
        BatchJob {
            id: "batch_1".into(),
            status: status.into(),
            output_file_id: (status == "completed").then(|| "file_out".to_string()),
            error_file_id: None,
        }
    }
}

#[async_trait]
impl BatchApi for ScriptedBatches {
    async fn upload_jsonl(&self, _file_name: &str, body: String) -> Result<String, LlmError> {
        self.uploaded.lock().push(body);
        Ok("file_in".into())
    }

    async fn create_batch(&self, input_file_id: &str, endpoint: &str, _window: &str) -> Result<BatchJob, LlmError> {
        assert_eq!(input_file_id, "file_in");
        assert_eq!(endpoint, "/v1/responses");
        Ok(self.job("validating"))
    }

    async fn retrieve_batch(&self, _batch_id: &str) -> Result<BatchJob, LlmError> {
        let status = self.polls.lock().pop_front().unwrap_or(self.final_status);
        Ok(self.job(status))
    }

    async fn file_content(&self, file_id: &str) -> Result<String, LlmError> {
        assert_eq!(file_id, "file_out");
        Ok(self.output.clone())
    }
}

fn result_line(index: usize, text: &str) -> String {
    json!({
        "custom_id": format!("request-{index}"),
        "response": {
            "status_code": 200,
            "body": {"output": [{"type": "message", "content": [{"type": "output_text", "text": text}]}]}
        },
        "error": null
    })
    .to_string()
}

fn runner(api: Arc<ScriptedBatches>, max_wait: Duration) -> BatchRunner {
    BatchRunner::new(api, Duration::from_millis(1), max_wait)
}

#[tokio::test]
async fn completed_batch_maps_results_by_index() {
    let output = [result_line(1, "second"), result_line(0, "first")].join("\n");
    let api = Arc::new(ScriptedBatches::new(&["in_progress", "finalizing"], "completed", output));
    let profile = ProfileBuilder::default().profile(Capability::Search);
    let prompts = vec!["a".to_string(), "b".to_string(), "c".to_string()];

    let out = runner(api.clone(), Duration::from_secs(5))
        .run(&profile, "sys", &prompts)
        .await
        .unwrap();

    assert_eq!(out[0].text().as_deref(), Some("first"));
    assert_eq!(out[1].text().as_deref(), Some("second"));
    assert_eq!(out[2], BatchOutcome::Missing);
    assert_eq!(api.uploaded.lock()[0].lines().count(), 3);
}

#[tokio::test]
async fn batch_that_never_finishes_times_out() {
    let api = Arc::new(ScriptedBatches::new(&[], "in_progress", String::new()));
    let profile = ProfileBuilder::default().profile(Capability::Search);

    let err = runner(api, Duration::from_millis(20))
        .run(&profile, "sys", &["a".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::BatchTimeout { ref batch_id, .. } if batch_id == "batch_1"));
}

#[tokio::test]
async fn failed_batch_is_an_error() {
    let api = Arc::new(ScriptedBatches::new(&["in_progress"], "failed", String::new()));
    let profile = ProfileBuilder::default().profile(Capability::Search);

    let err = runner(api, Duration::from_secs(5))
        .run(&profile, "sys", &["a".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::BatchFailed { ref status, .. } if status == "failed"));
}

#[tokio::test]
async fn summarization_uses_batch_when_enabled() {
    let summary = json!({"summary": {"introduction": "Intro.", "content": "Body."}}).to_string();
    let output = [result_line(0, &summary), result_line(1, "not json")].join("\n");
    let api = Arc::new(ScriptedBatches::new(&[], "completed", output));

    let mut cfg = AppConfig::default();
    cfg.batch.enabled = true;
    let h = common::harness_with(cfg, MockLlm::new(), MockFetch::new());
    let ctx = h.ctx.clone().with_batch(Arc::new(runner(api.clone(), Duration::from_secs(5))));

    let items: Vec<NewsItem> = ["https://a.test/1", "https://a.test/2"]
        .into_iter()
        .map(|url| NewsItem {
            title: "t".into(),
            url: url.into(),
            date: chrono::NaiveDate::from_ymd_opt(2025, 6, 12).unwrap(),
            language: None,
            source: None,
            body: None,
        })
        .collect();

    let out = summarize_news(&ctx, items).await.unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].url, "https://a.test/1");
    // no per-item calls when the batch path is active
    assert_eq!(h.llm.call_count(), 0);
    assert!(api.uploaded.lock()[0].contains("https://a.test/2"));
}
