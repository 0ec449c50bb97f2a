//! Natours Web Server
//!
//! HTTP surface of the credential subsystem: signup, login, password reset
//! and update, plus bearer/cookie authentication and role gating.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

// Re-export main types
pub use error::ApiError;
pub use server::{NatoursServer, NatoursServerBuilder};
pub use state::AppState;

use axum::{extract::DefaultBodyLimit, Router};
use natours_core::NatoursError;
use tower_http::trace::TraceLayer;

/// Largest accepted request body
const BODY_LIMIT: usize = 10 * 1024;

/// Create the main application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes(&state))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}

/// Error types for the web server
#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    #[error(transparent)]
    Natours(#[from] NatoursError),
}

/// Result type for web operations
pub type WebResult<T> = Result<T, WebError>;
