//! CaseKB HTTP server
//!
//! Exposes the retrieval pipeline under `/api` and maps the shared
//! error taxonomy onto HTTP status codes.

pub mod http;
pub mod state;

pub use http::create_router;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use casekb_core::Error;

/// Wrapper making the core taxonomy an axum response
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        Error::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::EmbeddingFailure(_) => StatusCode::BAD_GATEWAY,
        // A summariser failure alone never fails a request; reaching
        // here means the caller asked for a summary and nothing else
        Error::SummariserFailure(_) => StatusCode::OK,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::Busy(_) => StatusCode::TOO_MANY_REQUESTS,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn kind_for(err: &Error) -> &'static str {
    match err {
        Error::InvalidArgument(_) => "invalid_argument",
        Error::BackendUnavailable(_) => "backend_unavailable",
        Error::EmbeddingFailure(_) => "embedding_failure",
        Error::SummariserFailure(_) => "summariser_failure",
        Error::Timeout(_) => "timeout",
        Error::Busy(_) => "busy",
        Error::NotFound(_) => "not_found",
        Error::Internal(_) => "internal",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        let body = Json(serde_json::json!({
            "success": false,
            "error": kind_for(&self.0),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&Error::InvalidArgument("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::BackendUnavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&Error::EmbeddingFailure("x".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&Error::Timeout("x".into())),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(status_for(&Error::Busy("x".into())), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(&Error::NotFound("x".into())), StatusCode::NOT_FOUND);
    }
}
