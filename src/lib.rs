//! Hashstore Server Library
//!
//! Content-addressed file storage over HTTP. Clients upload a file and get
//! back the hex digest of its bytes; that hash is later used to download or
//! delete the blob.
//!
//! # Modules
//!
//! - `store`: Key derivation, sharded placement and atomic publication
//! - `routes`: HTTP handlers mapping store outcomes to status envelopes
//! - `config`: Startup configuration

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;
pub mod upload;

use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the application router
pub fn app(state: AppState) -> Router {
    let max_body_size = state.config().upload.max_body_size;

    Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(routes::blobs::router(max_body_size))
        .fallback(error::not_found_fallback)
        .layer(middleware::map_response(error::envelope_method_not_allowed))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
