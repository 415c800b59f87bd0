use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Envelope every endpoint answers with, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub error: bool,
    pub code: u16,
    pub status: u8,
    pub message: String,
    pub payload: Value,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>, payload: Value) -> Self {
        Self::with_code(StatusCode::OK, message, payload)
    }

    pub fn created(message: impl Into<String>, payload: Value) -> Self {
        Self::with_code(StatusCode::CREATED, message, payload)
    }

    pub fn failure(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error: true,
            code: code.as_u16(),
            status: 0,
            message: message.into(),
            payload: json!({}),
        }
    }

    fn with_code(code: StatusCode, message: impl Into<String>, payload: Value) -> Self {
        Self {
            error: false,
            code: code.as_u16(),
            status: 1,
            message: message.into(),
            payload,
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}
