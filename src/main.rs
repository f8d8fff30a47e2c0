//! Exchange gateway — binary entrypoint.
//! Boots the Axum HTTP server, wiring config, store, ingestion and routes.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use exchange_gateway::api::{self, AppState};
use exchange_gateway::config::AppConfig;
use exchange_gateway::ingest::coordinator::{ConfigAdapterFactory, Coordinator, Freshness};
use exchange_gateway::ingest::types::Scope;
use exchange_gateway::metrics::Metrics;
use exchange_gateway::store::Store;
use exchange_gateway::translate::Translator;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("exchange_gateway=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::load().context("loading configuration")?;
    let metrics = Metrics::init(&config.cache);

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("creating database directory")?;
        }
    }
    let store = Arc::new(Store::open(&config.database.path).context("opening database")?);
    let factory =
        Arc::new(ConfigAdapterFactory::from_config(&config).context("building source adapters")?);
    let coordinator = Arc::new(Coordinator::new(store.clone(), factory, config.cache.clone()));
    let translator = Translator::from_config(&config.news.translate)
        .context("building translator")?
        .map(Arc::new);

    // Startup news pull: best effort, never blocks readiness.
    if config.news.refresh_on_startup {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            match coordinator.refresh(Scope::News).await {
                Ok(report) => {
                    tracing::info!(written = report.written, "startup news ingest done");
                }
                Err(e) => tracing::warn!(error = %e, "startup news ingest failed"),
            }
        });
    }

    // Periodic re-check: ingests only when the news scope has gone stale.
    if config.news.refresh_interval_secs > 0 {
        let coordinator = coordinator.clone();
        let period = std::time::Duration::from_secs(config.news.refresh_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match coordinator.ensure_fresh(Scope::News).await {
                    Ok(Freshness::Refreshed(report)) => {
                        tracing::info!(written = report.written, "periodic news ingest done");
                    }
                    Ok(Freshness::Fresh) => {}
                    Err(e) => tracing::warn!(error = %e, "periodic news ingest failed"),
                }
            }
        });
    }

    let state = AppState {
        store,
        coordinator,
        translator,
    };
    let app = api::create_router(state).merge(metrics.router());

    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await.context("serving http")?;
    Ok(())
}
