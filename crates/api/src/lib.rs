//! HTTP API layer for taskdesk.
//!
//! This crate provides the web surface of the back office:
//!
//! - **Endpoints**: client, freelancer and admin task flows, payment callbacks,
//!   file downloads, consent/language cookies, newsletter and ratings
//! - **Extractors**: authentication, client address, form redirect target, multipart uploads
//! - **Responses**: JSON envelopes and flash-redirects for form posts
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

use axum::{Router, extract::DefaultBodyLimit, middleware::from_fn_with_state};

pub use endpoints::router;
pub use middleware::{AppState, Logo, auth_middleware};

/// The full application with authentication applied.
pub fn app(state: AppState) -> Router {
    router()
        .layer(DefaultBodyLimit::max(state.config.storage.max_upload_bytes))
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
