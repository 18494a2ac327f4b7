mod health;
mod operations;

use crate::domain::Error;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
pub use health::health;
pub use operations::{get_operation, get_operations, submit_operation};
use serde_json::json;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Error::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("internal server error"),
            ),
        };
        let body = Json(json!({
            "error": error_message,
        }));
        (status, body).into_response()
    }
}
