use crate::server::telemetry::increment_store_errors;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Request-level failure returned by the HTTP handlers.
///
/// Store outages are surfaced as `503` rather than masked with zero counts,
/// so a successful response always carries real values.
#[derive(Debug)]
pub enum ApiError {
    /// Failure reported by the coordination layer.
    Core(tally_core::Error),
    /// The request was malformed.
    BadRequest(String),
    /// A response could not be assembled.
    Internal(String),
}

impl From<tally_core::Error> for ApiError {
    fn from(err: tally_core::Error) -> Self {
        Self::Core(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Core(tally_core::Error::StoreUnavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Core(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Core(err) => {
                if err.is_store_unavailable() {
                    increment_store_errors();
                    tracing::warn!(error = %err, "Store unavailable");
                } else {
                    tracing::error!(error = %err, "Request failed");
                }
                err.to_string()
            }
            Self::BadRequest(reason) => reason,
            Self::Internal(reason) => {
                tracing::error!(%reason, "Request failed");
                reason
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
