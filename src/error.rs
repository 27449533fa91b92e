//! Error codes shared by services and the JSON API.
//!
//! DESIGN
//! ======
//! Each service owns a `thiserror` enum. Implementing `ErrorCode` gives it a
//! stable machine-readable code and an HTTP status; `ApiError` turns any such
//! error into a `{ "code", "message" }` JSON body. Internal errors are logged
//! and their detail replaced by a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";

pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn status(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }

    /// Build from a service error. 5xx errors are logged and their message hidden.
    #[must_use]
    pub fn from_err(err: &(impl ErrorCode + ?Sized)) -> Self {
        let status = err.status();
        if status.is_server_error() {
            tracing::error!(error = %err, code = err.error_code(), "request failed");
            return Self::new(status, err.error_code(), "Internal server error");
        }
        Self::new(status, err.error_code(), err.to_string())
    }

    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Unauthorized")
    }

    #[must_use]
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    enum Sample {
        #[error("email taken")]
        Taken,
        #[error("db exploded: secret detail")]
        Db,
    }

    impl ErrorCode for Sample {
        fn error_code(&self) -> &'static str {
            match self {
                Self::Taken => "TAKEN",
                Self::Db => INTERNAL_SERVER_ERROR,
            }
        }

        fn status(&self) -> StatusCode {
            match self {
                Self::Taken => StatusCode::UNPROCESSABLE_ENTITY,
                Self::Db => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }

    #[test]
    fn client_errors_keep_their_message() {
        let api = ApiError::from_err(&Sample::Taken);
        assert_eq!(api.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(api.code, "TAKEN");
        assert_eq!(api.message, "email taken");
    }

    #[test]
    fn server_errors_hide_detail() {
        let api = ApiError::from_err(&Sample::Db);
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api.message.contains("secret"));
    }

    #[test]
    fn serializes_code_and_message_only() {
        let api = ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Unauthorized");
        let json = serde_json::to_value(&api).unwrap();
        assert_eq!(json, serde_json::json!({ "code": "UNAUTHORIZED", "message": "Unauthorized" }));
    }

    #[test]
    fn into_response_uses_status() {
        let resp = ApiError::unauthorized().into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
