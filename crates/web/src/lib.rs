pub mod handlers;
pub mod registry;

use std::{sync::Arc, time::Duration};

use axum::{
    extract::FromRef,
    http::{header, Request, StatusCode},
    Router,
};
use forge_dispatch_agent::Agent;
use forge_dispatch_core::config::Config;
use forge_dispatch_github::GitHub;
use tower::ServiceBuilder;
use tower_http::{
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, MakeSpan, TraceLayer},
    ServiceBuilderExt,
};
use tracing::{Level, Span};

use crate::registry::LabelHandlers;

/// Process-wide immutable state. Everything here is built once at startup;
/// request handlers only read it.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub config: Arc<Config>,
    pub github: Arc<GitHub>,
    pub agent: Arc<dyn Agent>,
    pub handlers: Arc<LabelHandlers>,
}

pub fn app(state: AppState) -> Router {
    let sensitive_headers: Arc<[_]> = vec![header::AUTHORIZATION].into();
    let middleware = ServiceBuilder::new()
        .sensitive_request_headers(sensitive_headers.clone())
        .sensitive_response_headers(sensitive_headers)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(HookMakeSpan)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // must outlast the agent's 300s read budget, the binding bound on
        // request latency
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(330),
        ));
    handlers::build_router().with_state(state).layer(middleware)
}

#[derive(Debug, Clone)]
struct HookMakeSpan;

impl<B> MakeSpan<B> for HookMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let delivery = request
            .headers()
            .get("X-GitHub-Delivery")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        tracing::span!(
            Level::INFO,
            "request",
            method = %request.method(),
            uri = %request.uri(),
            delivery = %delivery,
        )
    }
}
