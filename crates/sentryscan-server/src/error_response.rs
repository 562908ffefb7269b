//! Maps `sentryscan_core::Error` to an HTTP response per its
//! `status_class()`. Lives in the server crate because only an
//! HTTP-facing surface cares about status codes — the engine and probe
//! crates stay transport-agnostic.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sentryscan_core::{Error, StatusClass};
use serde_json::json;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.status_class() {
            StatusClass::BadRequest => StatusCode::BAD_REQUEST,
            StatusClass::Unauthorized => StatusCode::UNAUTHORIZED,
            StatusClass::Policy => StatusCode::FORBIDDEN,
            StatusClass::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            StatusClass::Resolution => StatusCode::UNPROCESSABLE_ENTITY,
            StatusClass::Cancelled => StatusCode::CONFLICT,
            StatusClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
