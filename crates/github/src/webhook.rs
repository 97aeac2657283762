use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRef, FromRequest, Request},
};
use forge_dispatch_core::{config::Config, AppError};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Verified webhook delivery: the generic event envelope GitHub posts,
/// after signature verification but before event-specific parsing.
#[derive(Debug, Clone)]
#[must_use]
pub struct WebhookEnvelope {
    /// `X-GitHub-Event` header value, e.g. `pull_request`.
    pub event_type: String,
    /// `X-GitHub-Delivery` header value, unique per delivery.
    pub delivery_id: String,
    pub payload: serde_json::Value,
}

impl WebhookEnvelope {
    pub fn action(&self) -> Option<&str> {
        self.payload.get("action").and_then(serde_json::Value::as_str)
    }

    pub fn installation_id(&self) -> Result<u64, AppError> {
        self.payload
            .get("installation")
            .and_then(|v| v.get("id"))
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| AppError::validation("event payload is missing installation.id"))
    }
}

impl<S> FromRequest<S> for WebhookEnvelope
where
    Arc<Config>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let event_type = req
            .headers()
            .get("X-GitHub-Event")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::validation("X-GitHub-Event header missing"))?
            .to_string();
        let delivery_id = req
            .headers()
            .get("X-GitHub-Delivery")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::validation("X-GitHub-Delivery header missing"))?
            .to_string();
        let signature = req
            .headers()
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("sha256="))
            .and_then(|v| hex::decode(v).ok())
            .ok_or(AppError::Authentication)?;

        let config = <Arc<Config>>::from_ref(state);
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|_| AppError::validation("error reading request body"))?;
        let mut mac =
            Hmac::<Sha256>::new_from_slice(config.github_app.webhook_secret.expose().as_bytes())
                .expect("HMAC can take key of any size");
        mac.update(&body);
        // verify_slice is constant-time
        if mac.verify_slice(&signature).is_err() {
            tracing::warn!(delivery = %delivery_id, "webhook signature mismatch");
            return Err(AppError::Authentication);
        }

        let payload = serde_json::from_slice(&body)
            .map_err(|e| AppError::validation(format!("error parsing webhook body: {e}")))?;
        Ok(WebhookEnvelope { event_type, delivery_id, payload })
    }
}
