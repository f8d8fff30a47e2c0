use axum::extract::State;
use axum::{routing::get, Router};
use metrics::{describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::CacheConfig;

/// Global Prometheus recorder plus the router serving its exposition
/// endpoint. Install once at startup, before the first counter is touched.
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    pub fn init(cache: &CacheConfig) -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");

        describe_gauge!(
            "cache_ttl_seconds",
            "Configured freshness window per cache domain"
        );
        gauge!("cache_ttl_seconds", "domain" => "pairs").set(cache.pairs_ttl_secs as f64);
        gauge!("cache_ttl_seconds", "domain" => "news").set(cache.news_ttl_secs as f64);

        Self { handle }
    }

    /// `GET /metrics` in Prometheus exposition format.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(render))
            .with_state(self.handle.clone())
    }
}

async fn render(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
