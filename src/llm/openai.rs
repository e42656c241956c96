//! OpenAI transport: Chat Completions, Responses, Files and Batches.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{ModelTable, OpenAiConfig};
use crate::error::LlmError;

use super::batch::{BatchApi, BatchJob};
use super::{LlmClient, Response, ResponseRequest};

const USER_AGENT: &str = concat!("techpress/", env!("CARGO_PKG_VERSION"));

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(cfg: &OpenAiConfig, models: &ModelTable) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            chat_model: models.chat.clone(),
            temperature: cfg.temperature,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        Err(status_error(resp).await)
    }
}

/// Map a non-success response to an [`LlmError`]; 429 is kept distinct.
async fn status_error(resp: reqwest::Response) -> LlmError {
    let status = resp.status().as_u16();
    if status == 429 {
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return LlmError::RateLimited { retry_after };
    }

    let body = resp.text().await.unwrap_or_default();
    LlmError::Provider {
        status,
        message: provider_message(&body),
    }
}

/// `error.message` from an OpenAI error envelope, or the raw body.
fn provider_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Envelope {
        error: Inner,
    }
    #[derive(Deserialize)]
    struct Inner {
        message: String,
    }
    match serde_json::from_str::<Envelope>(body) {
        Ok(env) => env.error.message,
        Err(_) => body.chars().take(500).collect(),
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            #[serde(default)]
            content: Option<String>,
        }

        let req = Req {
            model: &self.chat_model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
        };

        let resp = self
            .http
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;
        let resp = Self::check(resp).await?;

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("completion without content".into()))
    }

    async fn respond(&self, request: &ResponseRequest) -> Result<Response, LlmError> {
        let resp = self
            .http
            .post(self.url("responses"))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        let resp = Self::check(resp).await?;

        resp.json::<Response>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[async_trait]
impl BatchApi for OpenAiClient {
    async fn upload_jsonl(&self, file_name: &str, body: String) -> Result<String, LlmError> {
        #[derive(Deserialize)]
        struct FileObject {
            id: String,
        }

        let part = Part::text(body)
            .file_name(file_name.to_string())
            .mime_str("application/jsonl")?;
        let form = Form::new().text("purpose", "batch").part("file", part);

        let resp = self
            .http
            .post(self.url("files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        let file: FileObject = resp
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(file.id)
    }

    async fn create_batch(
        &self,
        input_file_id: &str,
        endpoint: &str,
        completion_window: &str,
    ) -> Result<BatchJob, LlmError> {
        let resp = self
            .http
            .post(self.url("batches"))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "input_file_id": input_file_id,
                "endpoint": endpoint,
                "completion_window": completion_window,
            }))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        resp.json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchJob, LlmError> {
        let resp = self
            .http
            .get(self.url(&format!("batches/{batch_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        resp.json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    async fn file_content(&self, file_id: &str) -> Result<String, LlmError> {
        let resp = self
            .http
            .get(self.url(&format!("files/{file_id}/content")))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.text().await?)
    }
}
