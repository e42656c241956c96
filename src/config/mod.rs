//! Application configuration.
//!
//! Loaded once at start-up from TOML and passed down explicitly; nothing in
//! the crate reads configuration from ambient globals. Every section has
//! serde defaults so an empty file is a valid configuration.

pub mod openai;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use openai::OpenAiConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/techpress.toml";
pub const ENV_CONFIG_PATH: &str = "TECHPRESS_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub models: ModelTable,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Parse without resolving secrets (tests, validation).
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(s).context("parsing techpress config")?;
        Ok(cfg)
    }

    /// Load from an explicit path and resolve "ENV" placeholders.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg = Self::from_toml_str(&content)?;
        cfg.resolve()?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $TECHPRESS_CONFIG
    /// 2) config/techpress.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        let mut cfg = Self::default();
        cfg.resolve()?;
        Ok(cfg)
    }

    fn resolve(&mut self) -> Result<()> {
        self.openai.resolve()?;
        self.github.resolve();
        self.pipeline.sanitize();
        if self.batch.poll_interval_secs == 0 {
            self.batch.poll_interval_secs = default_poll_interval_secs();
        }
        Ok(())
    }
}

/// Model identifiers per capability tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelTable {
    #[serde(default = "default_chat_model")]
    pub chat: String,
    #[serde(default = "default_reasoning_model")]
    pub reasoning: String,
    #[serde(default = "default_research_model")]
    pub research: String,
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}
fn default_reasoning_model() -> String {
    "o4-mini".to_string()
}
fn default_research_model() -> String {
    "o4-mini-deep-research".to_string()
}

impl Default for ModelTable {
    fn default() -> Self {
        Self {
            chat: default_chat_model(),
            reasoning: default_reasoning_model(),
            research: default_research_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Trailing window used by EVAL and by news extraction.
    #[serde(default = "default_recency_days")]
    pub recency_days: i64,
    /// Below this many qualifying sources, SRCS runs discovery first.
    #[serde(default = "default_min_sources")]
    pub min_sources: usize,
    /// Sources need a score strictly above this to be read.
    #[serde(default)]
    pub source_score_threshold: f64,
    /// Sources at or below this score are listed as vetoed during discovery.
    #[serde(default = "default_veto_score")]
    pub veto_score: f64,
    #[serde(default = "default_initial_source_score")]
    pub initial_source_score: f64,
    /// Score forced on feeds that fail the reachability check.
    #[serde(default = "default_unavailable_score")]
    pub unavailable_score: f64,
    #[serde(default = "default_score_decrement")]
    pub score_decrement: f64,
    #[serde(default = "default_score_increment")]
    pub score_increment: f64,
    #[serde(default = "default_analyze_readme_chars")]
    pub analyze_readme_chars: usize,
    #[serde(default = "default_write_readme_chars")]
    pub write_readme_chars: usize,
    /// Language the news titles and articles are written in.
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_topics")]
    pub topics: String,
    #[serde(default = "default_readme_raw_base")]
    pub readme_raw_base: String,
    #[serde(default = "default_cta")]
    pub cta: String,
    /// Headlines of a feed shown to the model when scoring it.
    #[serde(default = "default_feed_sample_size")]
    pub feed_sample_size: usize,
}

/// Upper bound for `recency_days`; larger windows are clamped on load.
pub const MAX_RECENCY_DAYS: i64 = 3_650;

fn default_recency_days() -> i64 {
    7
}
fn default_min_sources() -> usize {
    50
}
fn default_veto_score() -> f64 {
    -1.0
}
fn default_initial_source_score() -> f64 {
    0.5
}
fn default_unavailable_score() -> f64 {
    -1.0
}
fn default_score_decrement() -> f64 {
    0.1
}
fn default_score_increment() -> f64 {
    0.2
}
fn default_analyze_readme_chars() -> usize {
    800
}
fn default_write_readme_chars() -> usize {
    4000
}
fn default_locale() -> String {
    "Spanish".to_string()
}
fn default_topics() -> String {
    "Python, Java, JavaScript, TypeScript, Go, Rust".to_string()
}
fn default_readme_raw_base() -> String {
    "https://raw.githubusercontent.com".to_string()
}
fn default_cta() -> String {
    "If you like the project, drop by the repo and leave your feedback! ⭐️".to_string()
}
fn default_feed_sample_size() -> usize {
    15
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recency_days: default_recency_days(),
            min_sources: default_min_sources(),
            source_score_threshold: 0.0,
            veto_score: default_veto_score(),
            initial_source_score: default_initial_source_score(),
            unavailable_score: default_unavailable_score(),
            score_decrement: default_score_decrement(),
            score_increment: default_score_increment(),
            analyze_readme_chars: default_analyze_readme_chars(),
            write_readme_chars: default_write_readme_chars(),
            locale: default_locale(),
            topics: default_topics(),
            readme_raw_base: default_readme_raw_base(),
            cta: default_cta(),
            feed_sample_size: default_feed_sample_size(),
        }
    }
}

impl PipelineConfig {
    fn sanitize(&mut self) {
        if self.recency_days <= 0 {
            self.recency_days = default_recency_days();
        }
        self.recency_days = self.recency_days.min(MAX_RECENCY_DAYS);
        if self.score_decrement < 0.0 {
            self.score_decrement = -self.score_decrement;
        }
        if self.score_increment < 0.0 {
            self.score_increment = -self.score_increment;
        }
        self.readme_raw_base = self.readme_raw_base.trim_end_matches('/').to_string();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Fraction of the delay used as +/- jitter (0.0 to 1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Summarize news through the batch endpoint instead of one call per item.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_completion_window")]
    pub completion_window: String,
}

fn default_poll_interval_secs() -> u64 {
    30
}
fn default_max_wait_secs() -> u64 {
    2 * 3600
}
fn default_completion_window() -> String {
    "24h".to_string()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
            completion_window: default_completion_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub user: String,
    /// "ENV" means: read from GITHUB_TOKEN (unauthenticated when unset).
    #[serde(default = "default_github_token")]
    pub token: String,
    /// Also sync repositories of the user's organisations.
    #[serde(default)]
    pub include_orgs: bool,
    #[serde(default = "default_github_api_base")]
    pub api_base: String,
}

fn default_github_token() -> String {
    "ENV".to_string()
}
fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            token: default_github_token(),
            include_orgs: false,
            api_base: default_github_api_base(),
        }
    }
}

impl GithubConfig {
    fn resolve(&mut self) {
        if self.token.trim().eq_ignore_ascii_case("env") {
            self.token = std::env::var("GITHUB_TOKEN").unwrap_or_default();
        }
        self.api_base = self.api_base.trim_end_matches('/').to_string();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot written after every mutation; `None` keeps data in memory only.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: Option<PathBuf>,
}

fn default_snapshot_path() -> Option<PathBuf> {
    Some(PathBuf::from("data/techpress.json"))
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Hours between update-all runs; 0 falls back to 24.
    #[serde(default)]
    pub interval_hours: u64,
}

impl SchedulerConfig {
    pub fn interval_secs(&self) -> u64 {
        let hours = if self.interval_hours == 0 { 24 } else { self.interval_hours };
        hours * 3600
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Static-site deploy hook POSTed when any post changed.
    #[serde(default)]
    pub rebuild_hook_url: Option<String>,
    #[serde(default = "default_rebuild_attempts")]
    pub rebuild_attempts: u32,
}

fn default_rebuild_attempts() -> u32 {
    3
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rebuild_hook_url: None,
            rebuild_attempts: default_rebuild_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_valid() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.pipeline.recency_days, 7);
        assert_eq!(cfg.pipeline.min_sources, 50);
        assert_eq!(cfg.models.chat, "gpt-4o");
        assert_eq!(cfg.openai.max_output_tokens, 8192);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
[pipeline]
recency_days = 14
locale = "English"

[models]
reasoning = "o3"
"#,
        )
        .unwrap();
        assert_eq!(cfg.pipeline.recency_days, 14);
        assert_eq!(cfg.pipeline.locale, "English");
        assert_eq!(cfg.pipeline.min_sources, 50);
        assert_eq!(cfg.models.reasoning, "o3");
        assert_eq!(cfg.models.chat, "gpt-4o");
    }

    #[test]
    fn sanitize_fixes_signs_and_windows() {
        let mut p = PipelineConfig {
            recency_days: 0,
            score_decrement: -0.1,
            readme_raw_base: "https://raw.test/".into(),
            ..PipelineConfig::default()
        };
        p.sanitize();
        assert_eq!(p.recency_days, 7);
        assert!((p.score_decrement - 0.1).abs() < 1e-9);
        assert_eq!(p.readme_raw_base, "https://raw.test");
    }

    #[test]
    fn scheduler_interval_defaults_to_a_day() {
        assert_eq!(SchedulerConfig::default().interval_secs(), 86_400);
    }

    #[test]
    fn sanitize_clamps_oversized_recency_window() {
        let mut p = PipelineConfig {
            recency_days: i64::MAX,
            ..PipelineConfig::default()
        };
        p.sanitize();
        assert_eq!(p.recency_days, MAX_RECENCY_DAYS);
    }
}
