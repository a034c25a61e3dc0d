//! Blob routes
//!
//! Endpoints:
//! - POST / - Upload a file (multipart field `file`), returns its content hash
//! - GET /:hash - Download a blob as an attachment
//! - DELETE /:hash - Delete a blob

use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::error::{status_line, AppError, Result};
use crate::state::AppState;
use crate::store::BlobKey;

/// Create the blob router
pub fn router(max_body_size: usize) -> Router<AppState> {
    Router::new()
        .route("/", post(upload_blob))
        .route("/:hash", get(download_blob).delete(delete_blob))
        .layer(DefaultBodyLimit::max(max_body_size))
}

/// Upload response
#[derive(Serialize)]
pub struct UploadResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub info: &'static str,
    pub hash: BlobKey,
}

/// Delete response
#[derive(Serialize)]
pub struct DeleteResponse {
    pub status: String,
    pub info: &'static str,
}

/// POST /
///
/// The extension is checked before the body is read, so rejected uploads
/// never reach the store.
async fn upload_blob(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let mut multipart = multipart.map_err(|e| AppError::BadRequest(e.body_text()))?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if !state.config().upload.allows(&filename) {
            return Err(AppError::WrongExtension(filename));
        }

        let data = field.bytes().await.map_err(multipart_error)?;
        if data.is_empty() {
            return Err(AppError::EmptyFile(filename));
        }

        let outcome = state.store().put(&data).await?;

        tracing::debug!(
            key = %outcome.key,
            filename = %filename,
            size = data.len(),
            created = outcome.created,
            "Upload handled"
        );

        let response = if outcome.created {
            (
                StatusCode::CREATED,
                Json(UploadResponse {
                    status: Some(status_line(StatusCode::CREATED)),
                    info: "File uploaded successfully.",
                    hash: outcome.key,
                }),
            )
        } else {
            (
                StatusCode::OK,
                Json(UploadResponse {
                    status: None,
                    info: "File already exists.",
                    hash: outcome.key,
                }),
            )
        };

        return Ok(response);
    }

    Err(AppError::BadRequest("missing multipart field 'file'".to_string()))
}

/// GET /:hash
async fn download_blob(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Response> {
    let key = parse_key(&state, &hash)?;
    let blob = state.store().get(&key).await?;

    tracing::debug!(key = %key, size = blob.size, "Serving blob");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, blob.size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", key),
        )
        .body(Body::from_stream(ReaderStream::new(blob.file)))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// DELETE /:hash
async fn delete_blob(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let key = parse_key(&state, &hash)?;
    state.store().delete(&key).await?;

    Ok(Json(DeleteResponse {
        status: status_line(StatusCode::OK),
        info: "File has been deleted.",
    }))
}

/// A hash that fails sanitation cannot name a stored blob
fn parse_key(state: &AppState, hash: &str) -> Result<BlobKey> {
    state
        .store()
        .parse_key(hash)
        .map_err(|e| AppError::NotFound(format!("{}: {}", hash, e)))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(e.body_text())
    }
}
