pub mod app;
pub mod config;
pub mod error;

pub use app::{AppState, RootResponse, router, serve, serve_listener};
pub use config::{ServerConfig, SessionMode};
pub use error::{ApiError, ServerError};
