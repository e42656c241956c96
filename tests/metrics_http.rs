// tests/metrics_http.rs
//
// Scrapes `/metrics` after driving a pipeline through the API router, so the
// exporter is checked against series the crate actually emits.

mod common;

use std::sync::Arc;

use axum::body::{self, Body};
use http::{header, Request, StatusCode};
use tower::ServiceExt as _; // for `oneshot`

use techpress::api::{router, AppState};
use techpress::config::AppConfig;
use techpress::fetch::MockFetch;
use techpress::github::MockRepoFetcher;
use techpress::llm::MockLlm;
use techpress::metrics::Metrics;
use techpress::pipeline::Orchestrator;
use techpress::store::Store;

use common::{harness_with, now, widget};

#[tokio::test]
async fn scrape_reports_post_pipeline_series() {
    let metrics = Metrics::init().expect("install recorder");
    let h = harness_with(
        AppConfig::default(),
        MockLlm::with_handler(|_| Ok("# Building widget\n\nSome words.".to_string())),
        MockFetch::new(),
    );
    h.store.create_repo(widget(now())).await.unwrap();
    let app = router(AppState::new(
        Orchestrator::new(h.ctx.clone()),
        Arc::new(MockRepoFetcher::default()),
    ))
    .merge(metrics.router());

    let resp = app
        .clone()
        .oneshot(Request::post("/posts/42").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("pipeline_runs_total{mode=\"POST\"} 1"), "{text}");
    assert!(text.contains("llm_calls_total"), "{text}");
    assert!(text.contains("outcome=\"ok\""), "{text}");
    assert!(text.contains("posts_saved_total 1"), "{text}");
}
