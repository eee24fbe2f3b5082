//! HTTP-facing errors of the gateway. Every variant renders as a JSON body.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub error: String,
    pub code: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    #[error("No route for {0}")]
    NotFound(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidBody(rejection) => rejection.status(),
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            status: "error",
            error: self.to_string(),
            code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
