use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use forge_dispatch_core::AppError;
use serde_json::json;
use tokio::process::Command;

use crate::Agent;

/// Key in the backend's response JSON holding the remote stdout.
const RESULT_FIELD: &str = "pangeo_forge_runner_result";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
// Remote builds are long-running
const READ_TIMEOUT: Duration = Duration::from_secs(300);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Agent backed by a token-protected Cloud Run service.
pub struct CloudRunAgent {
    service_url: String,
    invoker_keyfile: Option<String>,
    env: String,
    http: reqwest::Client,
}

impl CloudRunAgent {
    pub fn new(
        service_url: String,
        invoker_keyfile: Option<String>,
        env: String,
    ) -> Result<Self> {
        Self::with_read_timeout(service_url, invoker_keyfile, env, READ_TIMEOUT)
    }

    /// Shorten the read budget, e.g. when exercising timeout behavior in
    /// tests. The connect and pool budgets are fixed.
    pub fn with_read_timeout(
        service_url: String,
        invoker_keyfile: Option<String>,
        env: String,
        read_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(read_timeout)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()
            .context("Failed to build agent HTTP client")?;
        Ok(Self { service_url, invoker_keyfile, env, http })
    }

    /// Exchange the service-account keyfile for a short-lived identity
    /// token. Re-executed on every invocation; tokens expire too quickly to
    /// cache at this layer.
    async fn invoker_token(&self, keyfile: &str) -> Result<String, AppError> {
        check_output(
            "gcloud",
            &["auth", "activate-service-account", &format!("--key-file={keyfile}")],
        )
        .await?;
        check_output("gcloud", &["auth", "print-identity-token"]).await
    }
}

/// Runs the credential tool and captures its stdout. Failures here are part
/// of the agent invocation, so they share its error class.
async fn check_output(program: &str, args: &[&str]) -> Result<String, AppError> {
    let tool_error = |message: String| AppError::AgentInvocation {
        status: None,
        message,
        timed_out: false,
    };
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| tool_error(format!("failed to run {program}: {e}")))?;
    if !output.status.success() {
        return Err(tool_error(format!(
            "{program} {} exited with {}",
            args.first().copied().unwrap_or_default(),
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn transport_error(err: reqwest::Error) -> AppError {
    AppError::AgentInvocation {
        status: err.status().map(|s| s.as_u16()),
        message: err.to_string(),
        timed_out: err.is_timeout(),
    }
}

#[async_trait]
impl Agent for CloudRunAgent {
    async fn invoke(&self, cmd: &[String], pkgs: &[String]) -> Result<String, AppError> {
        let mut request = self.http.post(&self.service_url).json(&json!({
            "pangeo_forge_runner": { "cmd": cmd },
            "install": { "pkgs": pkgs, "env": self.env },
        }));
        if let Some(keyfile) = &self.invoker_keyfile {
            request = request.bearer_auth(self.invoker_token(keyfile).await?);
        }
        tracing::info!(url = %self.service_url, env = %self.env, "invoking agent");
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(AppError::AgentInvocation {
                status: Some(status.as_u16()),
                message: body,
                timed_out: false,
            });
        }
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|_| AppError::AgentInvocation {
                status: Some(status.as_u16()),
                message: format!("agent returned a non-JSON body: {body}"),
                timed_out: false,
            })?;
        value
            .get(RESULT_FIELD)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::AgentInvocation {
                status: Some(status.as_u16()),
                message: format!("agent response is missing '{RESULT_FIELD}': {body}"),
                timed_out: false,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use forge_dispatch_core::AppError;
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::CloudRunAgent;
    use crate::Agent;

    fn agent(url: String) -> CloudRunAgent {
        CloudRunAgent::new(url, None, "notebook".into()).unwrap()
    }

    fn cmd(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn returns_the_result_field_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({
                "pangeo_forge_runner": { "cmd": ["bake", "--json"] },
                "install": { "pkgs": ["fsspec"], "env": "notebook" },
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"pangeo_forge_runner_result": "ok"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let output =
            agent(server.uri()).invoke(&cmd(&["bake", "--json"]), &cmd(&["fsspec"])).await.unwrap();
        assert_eq!(output, "ok");
    }

    #[tokio::test]
    async fn missing_result_field_is_an_invocation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"stdout": "ok"})))
            .mount(&server)
            .await;

        let err = agent(server.uri()).invoke(&cmd(&["bake"]), &[]).await.unwrap_err();
        match err {
            AppError::AgentInvocation { status, ref message, timed_out } => {
                assert_eq!(status, Some(200));
                assert!(message.contains("pangeo_forge_runner_result"));
                assert!(!timed_out);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_2xx_status_carries_the_body_for_diagnostics() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("bake exploded"))
            .mount(&server)
            .await;

        let err = agent(server.uri()).invoke(&cmd(&["bake"]), &[]).await.unwrap_err();
        match err {
            AppError::AgentInvocation { status, ref message, timed_out } => {
                assert_eq!(status, Some(500));
                assert!(message.contains("bake exploded"));
                assert!(!timed_out);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_token_tool_invocations_are_agent_errors() {
        let err = super::check_output("forge-dispatch-no-such-tool", &["auth"]).await.unwrap_err();
        match err {
            AppError::AgentInvocation { status, ref message, timed_out } => {
                assert_eq!(status, None);
                assert!(message.contains("forge-dispatch-no-such-tool"));
                assert!(!timed_out);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = super::check_output("sh", &["-c", "exit 3"]).await.unwrap_err();
        match err {
            AppError::AgentInvocation { ref message, .. } => {
                assert!(message.contains("exited with"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    // The mock server cannot stall the TCP handshake, so the timeout is
    // simulated on the read budget; connect and read timeouts both surface
    // through transport_error with `timed_out` set.
    #[tokio::test]
    async fn a_slow_backend_times_out_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"pangeo_forge_runner_result": "late"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let agent = CloudRunAgent::with_read_timeout(
            server.uri(),
            None,
            "notebook".into(),
            Duration::from_millis(50),
        )
        .unwrap();
        let err = agent.invoke(&cmd(&["bake"]), &[]).await.unwrap_err();
        match err {
            AppError::AgentInvocation { timed_out, .. } => assert!(timed_out),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
