pub mod webhook;

use axum::{routing::post, Router};

use crate::AppState;

pub fn build_router() -> Router<AppState> {
    // GitHub webhook configurations commonly carry the trailing slash, and
    // axum 0.8 routes the two paths separately.
    Router::new()
        .route("/github/hooks", post(webhook::webhook))
        .route("/github/hooks/", post(webhook::webhook))
}
