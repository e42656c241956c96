use anyhow::{Context as _, Result};
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Safe to call more than once; later
    /// calls reuse the first handle.
    pub fn init() -> Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| {
                let handle = PrometheusBuilder::new()
                    .install_recorder()
                    .context("prometheus: install recorder")?;
                describe();
                Ok::<_, anyhow::Error>(handle)
            })?
            .clone();
        Ok(Self { handle })
    }

    /// Current exposition text for every registered series.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// `GET /metrics` in the Prometheus text format, stateful so it merges
    /// into the API router.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        Router::new()
            .route("/metrics", get(scrape))
            .with_state(self.clone())
    }
}

async fn scrape(State(metrics): State<Metrics>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.render(),
    )
}

fn describe() {
    describe_counter!("pipeline_runs_total", "Pipeline runs by mode");
    describe_counter!("pipeline_failures_total", "Pipeline runs that returned an error");
    describe_counter!("llm_calls_total", "Adapter calls by capability and outcome");
    describe_histogram!("llm_call_ms", Unit::Milliseconds, "Adapter call latency");
    describe_counter!("llm_rate_limited_total", "Rate-limited calls that were retried");
    describe_counter!("llm_batches_total", "Batch jobs by final status");
    describe_counter!("http_fetch_errors_total", "README and feed GETs that failed");
    describe_counter!("news_extracted_total", "Headlines kept by weekly extraction");
    describe_counter!("news_duplicates_total", "News items skipped as already known");
    describe_counter!("news_sources_unavailable_total", "Feeds that failed validation");
    describe_counter!("news_discarded_total", "Generated news items dropped as invalid");
    describe_counter!("news_saved_total", "News rows persisted");
    describe_counter!("posts_saved_total", "Posts created or replaced");
    describe_gauge!("posts_last_update_ts", Unit::Seconds, "Unix time of the last update-all");
    describe_counter!("scheduler_runs_total", "Scheduled update-all runs");
    describe_gauge!("scheduler_last_run_ts", Unit::Seconds, "Unix time of the last scheduled run");
    describe_counter!("rebuild_triggers_total", "Rebuild hook calls by outcome");
}
