//! Error types for the Hashstore server
//!
//! Every failure is rendered as the JSON status envelope
//! `{"status": "<code> <reason>"}`, with an `info` line where the API
//! defines one.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Wrong file extension: {0}")]
    WrongExtension(String),

    #[error("Empty file: {0}")]
    EmptyFile(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Status envelope body
#[derive(Serialize)]
pub struct StatusEnvelope {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<&'static str>,
}

impl StatusEnvelope {
    pub fn new(code: StatusCode) -> Self {
        Self {
            status: status_line(code),
            info: None,
        }
    }

    pub fn with_info(code: StatusCode, info: &'static str) -> Self {
        Self {
            status: status_line(code),
            info: Some(info),
        }
    }
}

/// "404 Not Found" style status text
pub fn status_line(code: StatusCode) -> String {
    match code.canonical_reason() {
        Some(reason) => format!("{} {}", code.as_u16(), reason),
        None => code.as_u16().to_string(),
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::WrongExtension(_) | AppError::EmptyFile(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Storage(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let envelope = match &self {
            AppError::WrongExtension(filename) => {
                tracing::debug!(filename = %filename, "Rejected upload extension");
                StatusEnvelope::with_info(status, "Wrong file extension.")
            }
            AppError::EmptyFile(filename) => {
                tracing::debug!(filename = %filename, "Rejected empty upload");
                StatusEnvelope::with_info(status, "Empty file.")
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                StatusEnvelope::new(status)
            }
            AppError::Storage(e) if !e.is_not_found() => {
                tracing::error!("Storage error: {}", e);
                StatusEnvelope::new(status)
            }
            other => {
                tracing::debug!("{}", other);
                StatusEnvelope::new(status)
            }
        };

        (status, Json(envelope)).into_response()
    }
}

/// Router fallback for paths no route matches
pub async fn not_found_fallback() -> AppError {
    AppError::NotFound("no such route".to_string())
}

/// Replace axum's empty 405 responses with the status envelope
pub async fn envelope_method_not_allowed(response: Response) -> Response {
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }

    let allow = response.headers().get(header::ALLOW).cloned();
    let mut envelope = AppError::MethodNotAllowed.into_response();
    if let Some(allow) = allow {
        envelope.headers_mut().insert(header::ALLOW, allow);
    }
    envelope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{HashAlgorithm, StoreError};

    #[test]
    fn test_status_line() {
        assert_eq!(status_line(StatusCode::NOT_FOUND), "404 Not Found");
        assert_eq!(status_line(StatusCode::CREATED), "201 Created");
        assert_eq!(
            status_line(StatusCode::METHOD_NOT_ALLOWED),
            "405 Method Not Allowed"
        );
    }

    #[test]
    fn test_envelope_serialization() {
        let plain = serde_json::to_value(StatusEnvelope::new(StatusCode::BAD_REQUEST)).unwrap();
        assert_eq!(plain, serde_json::json!({"status": "400 Bad Request"}));

        let with_info = serde_json::to_value(StatusEnvelope::with_info(
            StatusCode::BAD_REQUEST,
            "Wrong file extension.",
        ))
        .unwrap();
        assert_eq!(
            with_info,
            serde_json::json!({"status": "400 Bad Request", "info": "Wrong file extension."})
        );
    }

    #[test]
    fn test_store_errors_map_to_status() {
        let key = HashAlgorithm::Md5.key_for(b"test");

        let not_found = AppError::from(StoreError::NotFound(key.clone()));
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let collision = AppError::from(StoreError::Collision(key));
        assert_eq!(collision.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let io = AppError::from(StoreError::Io {
            action: "write",
            path: "store/09".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        });
        assert_eq!(io.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
