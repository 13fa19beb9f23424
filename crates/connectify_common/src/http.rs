// --- File: crates/connectify_common/src/http.rs ---
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use crate::error::{ConnectifyError, HttpStatusCode};

pub mod client;

/// Extension trait for ConnectifyError to convert it to an Axum HTTP response.
pub trait IntoHttpResponse {
    /// Converts the error into an Axum HTTP response.
    fn into_http_response(self) -> Response;
}

impl IntoHttpResponse for ConnectifyError {
    fn into_http_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            error!("Request failed with {}: {}", status_code, self);
        } else {
            warn!("Request rejected with {}: {}", status_code, self);
        }

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "code": status_code.as_u16(),
            }
        }));

        (status_code, body).into_response()
    }
}

/// Lets handlers return `Result<Json<T>, ConnectifyError>` directly.
impl IntoResponse for ConnectifyError {
    fn into_response(self) -> Response {
        self.into_http_response()
    }
}

/// Convert a Result<T, E> to a Result<Json<T>, ConnectifyError> with a custom error mapper.
pub fn map_json_error<T, E, F>(result: Result<T, E>, f: F) -> Result<Json<T>, ConnectifyError>
where
    T: serde::Serialize,
    F: FnOnce(E) -> ConnectifyError,
{
    result.map(Json).map_err(f)
}
