use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use storm_core::StormError;

/// Success envelope carrying only a message.
pub fn ok(message: &str) -> Json<Value> {
    Json(json!({"success": true, "message": message}))
}

/// 400 envelope for request-shape problems the command tier never sees.
pub fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"success": false, "message": message})),
    )
        .into_response()
}

/// 404 envelope with a custom message.
pub fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"success": false, "message": message})),
    )
        .into_response()
}

/// Command failures pass through with their stable code and HTTP status.
pub struct ApiError(pub StormError);

impl From<StormError> for ApiError {
    fn from(err: StormError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "success": false,
            "message": self.0.to_string(),
            "code": self.0.code(),
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
