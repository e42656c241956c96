// tests/common/mod.rs
//
// Shared wiring for integration tests: in-memory store, scripted LLM,
// scripted HTTP and a pinned clock.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use techpress::clock::FixedClock;
use techpress::config::AppConfig;
use techpress::context::Context;
use techpress::fetch::MockFetch;
use techpress::llm::MockLlm;
use techpress::model::{NewsSource, RepositoryRecord};
use techpress::store::MemoryStore;

pub struct Harness {
    pub ctx: Context,
    pub llm: Arc<MockLlm>,
    pub http: Arc<MockFetch>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
}

/// 2025-06-15 12:00:00 UTC.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
}

pub fn harness(llm: MockLlm, http: MockFetch) -> Harness {
    harness_with(AppConfig::default(), llm, http)
}

pub fn harness_with(config: AppConfig, llm: MockLlm, http: MockFetch) -> Harness {
    let llm = Arc::new(llm);
    let http = Arc::new(http);
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(now()));
    let ctx = Context::new(config, llm.clone(), http.clone(), store.clone(), clock.clone());
    Harness {
        ctx,
        llm,
        http,
        store,
        clock,
    }
}

pub fn widget_payload(updated_at: DateTime<Utc>) -> Value {
    json!({
        "id": 42,
        "name": "widget",
        "description": "A tiny widget toolkit",
        "url": "https://github.com/acme/widget",
        "language": "Rust",
        "stars": 12,
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": updated_at,
    })
}

pub fn widget(updated_at: DateTime<Utc>) -> RepositoryRecord {
    RepositoryRecord::from_payload(&widget_payload(updated_at)).unwrap()
}

pub fn source(name: &str, rss: &str, score: f64) -> NewsSource {
    NewsSource {
        id: 0,
        name: name.to_string(),
        url: format!("https://{name}.test"),
        rss: rss.to_string(),
        added_at: now(),
        score,
    }
}

pub const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Rust Blog</title>
    <link>https://blog.rust.test</link>
    <item>
      <title>Announcing Rust 1.88</title>
      <link>https://blog.rust.test/1.88</link>
      <pubDate>Thu, 12 Jun 2025 10:00:00 +0000</pubDate>
    </item>
    <item>
      <title>Cargo &amp; you</title>
      <link>https://blog.rust.test/cargo</link>
      <pubDate>Mon, 09 Jun 2025 08:30:00 +0000</pubDate>
    </item>
  </channel>
</rss>
"#;
