//! `{code, message, data}` envelope helpers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use uac_common::{ApiResponse, UacError};

/// Wrap `data` in the envelope with the given status
pub fn envelope<T: Serialize>(status: StatusCode, message: &str, data: Option<T>) -> Response {
    let body = ApiResponse::error(status.as_u16(), message, data);
    (status, Json(body)).into_response()
}

/// 200 with data
pub fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::ok(data))).into_response()
}

/// Envelope for an error with `data: null`; the status comes from the error
pub fn failure(err: &UacError, message: &str) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    } else {
        tracing::debug!(error = %err, "Request rejected");
    }

    envelope::<()>(status, message, None)
}
