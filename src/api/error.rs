use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::ingest::types::IngestError;
use crate::store::StoreError;

/// Handler-level error with an HTTP status mapping. The response body keeps
/// the same `{code, message, data}` envelope as success responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    MethodNotAllowed(String),
    #[error("{0}")]
    NotImplemented(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }
        let body = axum::Json(json!({
            "code": status.as_u16(),
            "message": self.to_string(),
            "data": null,
        }));
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::UnknownScope(name) => {
                AppError::BadRequest(format!("unsupported exchange: {name}"))
            }
            IngestError::AllSourcesFailed { .. } => AppError::BadGateway(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Scope;

    #[test]
    fn statuses_map_per_variant() {
        assert_eq!(
            AppError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::MethodNotAllowed("x".into()).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            AppError::NotImplemented("x".into()).status(),
            StatusCode::NOT_IMPLEMENTED
        );
    }

    #[test]
    fn unknown_scope_becomes_bad_request() {
        let err = AppError::from(IngestError::UnknownScope("nope".into()));
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(err.to_string(), "unsupported exchange: nope");
    }

    #[test]
    fn all_sources_failed_becomes_bad_gateway() {
        let err = AppError::from(IngestError::AllSourcesFailed {
            scope: Scope::News,
            errors: vec![],
        });
        assert!(matches!(err, AppError::BadGateway(_)));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn store_failure_stays_internal() {
        let err = AppError::from(IngestError::Store {
            scope: Scope::News,
            message: "disk full".into(),
        });
        assert!(matches!(err, AppError::Internal(_)));
    }
}
