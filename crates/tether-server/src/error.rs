use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tether_core::models::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid value '{value}' for {variable}: {reason}")]
    InvalidConfig {
        variable: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to open database: {0}")]
    Database(#[source] CoreError),
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Failure inside a request. Clients get a bare 500; the cause is only logged.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub CoreError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, kind = ?self.0.kind, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}
