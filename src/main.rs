//! techpress binary entrypoint.
//! Loads configuration, initialises logging and boots the Axum router on Shuttle.

use shuttle_axum::ShuttleAxum;

use techpress::config::AppConfig;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    let cfg = AppConfig::load_default()?;
    techpress::logging::init(&cfg.logging);

    tracing::info!(
        chat = %cfg.models.chat,
        reasoning = %cfg.models.reasoning,
        research = %cfg.models.research,
        batch = cfg.batch.enabled,
        "starting techpress"
    );

    let router = techpress::app(cfg).await?;
    Ok(router.into())
}
