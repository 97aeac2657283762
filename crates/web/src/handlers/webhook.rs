use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use forge_dispatch_core::AppError;
use forge_dispatch_github::{payload::PullRequestEvent, webhook::WebhookEnvelope};
use serde_json::json;

use crate::AppState;

/// Pull-request actions the dispatcher acts on. Everything else completes
/// as a no-op.
const HANDLED_ACTIONS: [&str; 4] = ["opened", "reopened", "synchronize", "labeled"];

/// Webhook dispatcher. The envelope extractor has already verified the
/// delivery signature; this handler parses the event, authenticates as the
/// triggering installation, and runs each matched label handler in order.
pub async fn webhook(
    State(state): State<AppState>,
    envelope: WebhookEnvelope,
) -> Result<Response, AppError> {
    if envelope.event_type != "pull_request" {
        tracing::debug!(
            event = %envelope.event_type,
            delivery = %envelope.delivery_id,
            "ignoring event type"
        );
        return Ok(no_op());
    }
    let action = envelope
        .action()
        .ok_or_else(|| AppError::validation("pull_request event is missing an action"))?
        .to_string();
    if !HANDLED_ACTIONS.contains(&action.as_str()) {
        tracing::debug!(action = %action, delivery = %envelope.delivery_id, "ignoring action");
        return Ok(no_op());
    }

    let installation_id = envelope.installation_id()?;
    let client = state.github.installation_client(installation_id)?;
    let event = PullRequestEvent::from_payload(&action, &envelope.payload)?;

    if !sender_authorized(&event) {
        tracing::warn!(
            sender = %event.sender.login,
            delivery = %envelope.delivery_id,
            "sender not authorized, skipping handlers"
        );
        return Ok(no_op());
    }

    let mut outcomes = Vec::new();
    for name in event.actionable_label_names() {
        let Some(handler) = state.handlers.get(name) else { continue };
        tracing::info!(
            label = name,
            sha = %event.head.sha,
            delivery = %envelope.delivery_id,
            "invoking label handler"
        );
        let result = handler.run(&event, &client, state.agent.as_ref()).await;
        record_outcome(name, &result);
        outcomes.push(HandlerOutcome { label: name.to_string(), result });
    }
    respond(outcomes)
}

fn no_op() -> Response { (StatusCode::OK, String::new()).into_response() }

/// Authorization predicate over the event's sender, evaluated before any
/// handler runs. Currently admits every well-formed sender.
pub fn sender_authorized(event: &PullRequestEvent) -> bool { !event.sender.login.is_empty() }

/// Records one handler's outcome after it returns, success or failure.
fn record_outcome(label: &str, result: &Result<String, AppError>) {
    match result {
        Ok(output) => {
            tracing::info!(label, output_bytes = output.len(), "label handler succeeded");
        }
        Err(err) => {
            tracing::error!(label, error = %err, "label handler failed");
        }
    }
}

struct HandlerOutcome {
    label: String,
    result: Result<String, AppError>,
}

/// Aggregates collected handler outcomes into the HTTP response. A single
/// outcome is returned raw; several are reported independently, keyed by
/// label, so one failure cannot hide another's result.
fn respond(mut outcomes: Vec<HandlerOutcome>) -> Result<Response, AppError> {
    if outcomes.is_empty() {
        return Ok(no_op());
    }
    if outcomes.len() == 1 {
        let outcome = outcomes.remove(0);
        return match outcome.result {
            Ok(output) => Ok((StatusCode::OK, output).into_response()),
            Err(err) => Err(err),
        };
    }
    let mut report = serde_json::Map::new();
    for outcome in outcomes {
        let value = match outcome.result {
            Ok(output) => json!({ "status": "ok", "output": output }),
            Err(err) => json!({ "status": "error", "error": err.to_string() }),
        };
        report.insert(outcome.label, value);
    }
    Ok((StatusCode::OK, Json(serde_json::Value::Object(report))).into_response())
}
