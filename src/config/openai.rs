// src/config/openai.rs
use serde::{Deserialize, Serialize};
use std::env;

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_max_output_tokens() -> u32 {
    8192
}
fn default_temperature() -> f32 {
    0.7
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_request_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Output-token cap for capabilities that apply one.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Temperature for the simple chat call.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Reasoning and deep-research calls can take minutes.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
            base_url: default_base_url(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl OpenAiConfig {
    /// Resolve "ENV" placeholders and sanitize numeric knobs.
    pub fn resolve(&mut self) -> anyhow::Result<()> {
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?;
        }

        self.base_url = self.base_url.trim_end_matches('/').to_string();

        if !(0.0..=2.0).contains(&self.temperature) {
            self.temperature = default_temperature();
        }
        if self.max_output_tokens == 0 {
            self.max_output_tokens = default_max_output_tokens();
        }
        Ok(())
    }
}
