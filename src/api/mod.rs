// src/api/mod.rs
pub mod error;
pub mod market;
pub mod news;

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::ingest::coordinator::Coordinator;
use crate::store::Store;
use crate::translate::Translator;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub coordinator: Arc<Coordinator>,
    /// Absent when no translation endpoint is configured; the backfill
    /// trigger answers 503 in that case.
    pub translator: Option<Arc<Translator>>,
}

/// Uniform `{code, message, data}` envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Self::with_message(data, "success")
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            code: 200,
            message: message.into(),
            data: Some(data),
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/symbols", get(market::list_symbols))
        .route(
            "/api/v1/symbols/refresh",
            get(market::refresh_requires_post).post(market::refresh_symbols),
        )
        .route("/api/v1/klines", get(market::klines))
        .route("/api/v1/depth", get(market::depth))
        .route("/api/v1/news", get(news::list_articles))
        .route(
            "/api/v1/news/refresh",
            get(news::refresh_requires_post).post(news::refresh),
        )
        .route(
            "/api/v1/news/translate",
            get(news::translate_requires_post).post(news::translate),
        )
        .route("/api/v1/news/{id}", get(news::article_detail))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct RootInfo {
    name: &'static str,
    version: &'static str,
}

async fn root() -> Json<RootInfo> {
    Json(RootInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}
