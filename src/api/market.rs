use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::{AppError, AppResult};
use crate::api::{ApiResponse, AppState};
use crate::ingest::types::{IngestError, MarketPair, PairKind, Scope};

const DEFAULT_EXCHANGE: &str = "toobit";

#[derive(Debug, Deserialize)]
pub struct SymbolsQuery {
    exchange: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

fn parse_query(q: &SymbolsQuery) -> AppResult<(String, Option<PairKind>)> {
    let exchange = q
        .exchange
        .as_deref()
        .unwrap_or(DEFAULT_EXCHANGE)
        .trim()
        .to_lowercase();
    let kind = match q.kind.as_deref() {
        None => None,
        Some(raw) => Some(PairKind::parse(raw).ok_or_else(|| {
            AppError::BadRequest("type must be 'spot' or 'contract'".into())
        })?),
    };
    Ok((exchange, kind))
}

/// `GET /api/v1/symbols` - stored pairs for one exchange, freshness-gated.
///
/// A stale scope triggers (or joins) an ingestion before reading. If that
/// ingestion fails but older rows exist, they are served as-is; the caller
/// only sees an error when there is nothing to fall back to.
pub async fn list_symbols(
    State(state): State<AppState>,
    Query(q): Query<SymbolsQuery>,
) -> AppResult<Json<ApiResponse<Vec<MarketPair>>>> {
    let (exchange, kind) = parse_query(&q)?;
    let scope = Scope::pairs(&exchange, kind);

    if let Err(e) = state.coordinator.ensure_fresh(scope).await {
        if let IngestError::UnknownScope(_) = e {
            return Err(e.into());
        }
        tracing::warn!(exchange = %exchange, error = %e, "refresh failed, falling back to stored rows");
        let pairs = state.store.list_pairs(&exchange, kind)?;
        if pairs.is_empty() {
            return Err(AppError::Internal(format!(
                "no stored pairs and refresh failed: {e}"
            )));
        }
        return Ok(ApiResponse::success(pairs));
    }

    let pairs = state.store.list_pairs(&exchange, kind)?;
    Ok(ApiResponse::success(pairs))
}

/// Counts reported back from a manual refresh trigger.
#[derive(Debug, Serialize)]
pub struct RefreshReport {
    pub records: usize,
    pub written: usize,
    pub rejected: usize,
    pub deduped: usize,
    pub source_errors: Vec<String>,
}

/// `POST /api/v1/symbols/refresh` - force an ingestion for one exchange
/// scope regardless of freshness.
pub async fn refresh_symbols(
    State(state): State<AppState>,
    Query(q): Query<SymbolsQuery>,
) -> AppResult<Json<ApiResponse<RefreshReport>>> {
    let (exchange, kind) = parse_query(&q)?;
    let report = state.coordinator.refresh(Scope::pairs(&exchange, kind)).await?;
    let out = RefreshReport {
        records: report.records,
        written: report.written,
        rejected: report.rejected,
        deduped: report.deduped,
        source_errors: report.source_errors.iter().map(|e| e.to_string()).collect(),
    };
    let message = format!("refreshed {} pairs for {exchange}", out.written);
    Ok(ApiResponse::with_message(out, message))
}

pub async fn refresh_requires_post() -> AppError {
    AppError::MethodNotAllowed("use POST /api/v1/symbols/refresh to trigger a refresh".into())
}

/// `GET /api/v1/klines` - reserved; candles are not served yet.
pub async fn klines() -> AppError {
    AppError::NotImplemented("klines endpoint is not implemented".into())
}

/// `GET /api/v1/depth` - reserved; order books are not served yet.
pub async fn depth() -> AppError {
    AppError::NotImplemented("depth endpoint is not implemented".into())
}
