pub mod config;

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Request-scoped error taxonomy. Each variant maps to a distinct HTTP
/// status class so callers (and GitHub's delivery log) can tell a rejected
/// signature from a broken upstream.
#[derive(Debug)]
pub enum AppError {
    /// Webhook signature missing, malformed, or mismatched. No handler runs.
    Authentication,
    /// Malformed payload or an ambiguous manifest in the target repository.
    Validation(String),
    /// A GitHub API call failed. Carries the upstream status when known.
    RemoteFetch { status: Option<u16>, message: String },
    /// The agent backend call failed, timed out, or returned a malformed
    /// result. Carries the upstream status and body for diagnostics.
    AgentInvocation { status: Option<u16>, message: String, timed_out: bool },
    /// Anything else. Details are logged, never echoed to the caller.
    Internal(anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self { Self::Validation(message.into()) }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self { Self::Internal(err.into()) }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "webhook signature verification failed"),
            Self::Validation(message) => write!(f, "{message}"),
            Self::RemoteFetch { status: Some(status), message } => {
                write!(f, "GitHub API request failed ({status}): {message}")
            }
            Self::RemoteFetch { status: None, message } => {
                write!(f, "GitHub API request failed: {message}")
            }
            Self::AgentInvocation { status, message, timed_out } => {
                write!(f, "agent invocation failed")?;
                if *timed_out {
                    write!(f, " (timed out)")?;
                }
                if let Some(status) = status {
                    write!(f, " ({status})")?;
                }
                write!(f, ": {message}")
            }
            Self::Internal(_) => write!(f, "internal error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Authentication => {
                tracing::warn!("{self}");
                (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
            }
            Self::Validation(_) => {
                tracing::warn!("{self}");
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()).into_response()
            }
            Self::RemoteFetch { .. } => {
                tracing::error!("{self}");
                (StatusCode::BAD_GATEWAY, self.to_string()).into_response()
            }
            Self::AgentInvocation { timed_out, .. } => {
                tracing::error!("{self}");
                let status = if timed_out {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::BAD_GATEWAY
                };
                (status, self.to_string()).into_response()
            }
            Self::Internal(err) => {
                tracing::error!("{err:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong").into_response()
            }
        }
    }
}

impl From<octocrab::Error> for AppError {
    fn from(err: octocrab::Error) -> Self {
        match err {
            octocrab::Error::GitHub { source, .. } => Self::RemoteFetch {
                status: Some(source.status_code.as_u16()),
                message: source.message.clone(),
            },
            other => Self::RemoteFetch { status: None, message: other.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::AppError;

    #[test]
    fn status_codes_distinguish_error_classes() {
        let cases = [
            (AppError::Authentication, StatusCode::UNAUTHORIZED),
            (AppError::validation("bad payload"), StatusCode::UNPROCESSABLE_ENTITY),
            (
                AppError::RemoteFetch { status: Some(404), message: "Not Found".into() },
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::AgentInvocation { status: Some(500), message: "boom".into(), timed_out: false },
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::AgentInvocation { status: None, message: "deadline".into(), timed_out: true },
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn internal_detail_is_not_echoed() {
        let err = AppError::internal(anyhow::anyhow!("secret connection string"));
        assert_eq!(err.to_string(), "internal error");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
