// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

mod common;

use std::sync::Arc;

use axum::{
    body::{self, Body},
    Router,
};
use chrono::Duration;
use http::{Request, StatusCode};
use serde_json::{json, Value as Json};
use tower::ServiceExt as _; // for `oneshot`

use techpress::api::{router, AppState};
use techpress::config::AppConfig;
use techpress::error::LlmError;
use techpress::fetch::MockFetch;
use techpress::github::{MockRepoFetcher, Owner};
use techpress::llm::MockLlm;
use techpress::pipeline::Orchestrator;
use techpress::store::Store;

use common::{harness_with, now, widget, widget_payload, Harness};

const BODY_LIMIT: usize = 1024 * 1024;

fn app(h: &Harness, github: MockRepoFetcher) -> Router {
    let orch = Orchestrator::new(h.ctx.clone());
    router(AppState::new(orch, Arc::new(github)))
}

fn writer() -> MockLlm {
    MockLlm::with_handler(|_| Ok("# Building widget\n\nSome words.".to_string()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Json) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Json::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Json::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}

#[tokio::test]
async fn health_returns_ok() {
    let h = harness_with(AppConfig::default(), MockLlm::new(), MockFetch::new());
    let (status, body) = send(&app(&h, MockRepoFetcher::default()), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Json::String("OK".into()));
}

#[tokio::test]
async fn errors_use_the_envelope() {
    let h = harness_with(AppConfig::default(), MockLlm::new(), MockFetch::new());
    let app = app(&h, MockRepoFetcher::default());

    let (status, body) = send(&app, "GET", "/repos/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    assert!(body["error"]["message"].as_str().unwrap().contains("999"));

    let (status, _) = send(&app, "POST", "/repos", Some(widget_payload(now()))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send(&app, "POST", "/repos", Some(widget_payload(now()))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");

    let (status, body) = send(&app, "POST", "/repos", Some(json!({"id": 1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn repo_crud_round() {
    let h = harness_with(AppConfig::default(), MockLlm::new(), MockFetch::new());
    let app = app(&h, MockRepoFetcher::default());

    send(&app, "POST", "/repos", Some(widget_payload(now()))).await;
    let mut other = widget_payload(now());
    other["id"] = json!(7);
    other["name"] = json!("gadget");
    other["stars"] = json!(99);
    send(&app, "POST", "/repos", Some(other)).await;

    let (status, body) = send(&app, "GET", "/repos?order_by=stars&direction=desc", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "gadget");
    assert_eq!(body[1]["name"], "widget");

    let (status, _) = send(&app, "PUT", "/repos/7", Some(widget_payload(now()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "DELETE", "/repos/7", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "GET", "/repos/7", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn post_generation_and_evaluation() {
    let h = harness_with(AppConfig::default(), writer(), MockFetch::new());
    h.store.create_repo(widget(now())).await.unwrap();
    let app = app(&h, MockRepoFetcher::default());

    let (status, body) = send(&app, "POST", "/posts/42", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], 42);
    assert_eq!(body["title"], "Building widget");
    let cta = h.ctx.pipeline().cta.clone();
    assert!(body["article"].as_str().unwrap().ends_with(&cta));

    let (status, body) = send(&app, "GET", "/posts/42", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 42);

    // recent repository: EVAL regenerates
    let (status, body) = send(&app, "PUT", "/posts/42", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "regenerated");

    // stale repository: EVAL skips without calling the model
    let calls = h.llm.call_count();
    h.clock.set(now() + Duration::days(30));
    let (status, body) = send(&app, "PUT", "/posts/42", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "skipped");
    assert_eq!(h.llm.call_count(), calls);
}

#[tokio::test]
async fn rate_limit_maps_to_429() {
    let llm = MockLlm::new();
    llm.push_error(LlmError::RateLimited { retry_after: None });
    let h = harness_with(AppConfig::default(), llm, MockFetch::new());
    h.store.create_repo(widget(now())).await.unwrap();
    let app = app(&h, MockRepoFetcher::default());

    let (status, body) = send(&app, "POST", "/posts/42", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "rate_limited");
}

#[tokio::test]
async fn github_sync_upserts_user_and_org_repositories() {
    let mut cfg = AppConfig::default();
    cfg.github.user = "acme".into();
    cfg.github.include_orgs = true;
    let h = harness_with(cfg, MockLlm::new(), MockFetch::new());
    h.store.create_repo(widget(now() - Duration::days(2))).await.unwrap();

    let mut org_repo = widget(now());
    org_repo.id = 100;
    org_repo.name = "toolbox".into();
    org_repo.url = "https://github.com/acme-labs/toolbox".into();
    let github = MockRepoFetcher::new(vec!["acme-labs".into()])
        .with_repo(Owner::User("acme".into()), widget(now()))
        .with_repo(Owner::Org("acme-labs".into()), org_repo);
    let app = app(&h, github);

    let (status, body) = send(&app, "POST", "/github/sync", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], 1);
    assert_eq!(body["updated"], 1);
    assert_eq!(body["owners"], json!(["acme", "acme-labs"]));

    assert_eq!(h.store.get_repo(42).await.unwrap().updated_at, now());
    assert!(h.store.get_repo(100).await.is_ok());
}

#[tokio::test]
async fn github_sync_requires_a_user() {
    let h = harness_with(AppConfig::default(), MockLlm::new(), MockFetch::new());
    let (status, _) = send(&app(&h, MockRepoFetcher::default()), "POST", "/github/sync", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_all_reports_counts() {
    let h = harness_with(AppConfig::default(), writer(), MockFetch::new());
    h.store.create_repo(widget(now())).await.unwrap();
    let mut stale = widget(now() - Duration::days(60));
    stale.id = 7;
    stale.name = "gadget".into();
    h.store.create_repo(stale).await.unwrap();
    let app = app(&h, MockRepoFetcher::default());

    let (status, body) = send(&app, "POST", "/posts/update-all", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["evaluated"], 2);
    assert_eq!(body["regenerated"], 1);
    assert_eq!(body["skipped"], 1);

    let (_, posts) = send(&app, "GET", "/posts", None).await;
    assert_eq!(posts.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn news_search_dry_run_persists_nothing() {
    let h = harness_with(
        AppConfig::default(),
        MockLlm::with_handler(|_| Ok("[]".to_string())),
        MockFetch::new(),
    );
    h.store
        .create_news_source(common::source("go", "https://go.test/rss", 0.5))
        .await
        .unwrap();
    let app = app(&h, MockRepoFetcher::default());

    let (status, body) = send(&app, "POST", "/news/search?dry_run=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "TEST");
    assert_eq!(body["saved"], 0);

    let (_, sources) = send(&app, "GET", "/sources", None).await;
    assert_eq!(sources[0]["score"], 0.5);
    let (_, news) = send(&app, "GET", "/news", None).await;
    assert_eq!(news, json!([]));
}
