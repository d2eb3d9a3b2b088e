//! Handler responses

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;

/// A status and an opaque body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl Response {
    /// 200 with a body (possibly empty)
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: Vec::new(),
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::with_message(StatusCode::BAD_REQUEST, message)
    }

    pub fn payload_too_large(message: &str) -> Self {
        Self::with_message(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::with_message(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn with_message(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            body: message.as_bytes().to_vec(),
        }
    }
}

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            self.body,
        )
            .into_response()
    }
}
