//! Label handler registry, constructed explicitly at startup and read-only
//! thereafter.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use forge_dispatch_agent::Agent;
use forge_dispatch_core::AppError;
use forge_dispatch_github::{payload::PullRequestEvent, reqs};
use octocrab::Octocrab;

/// An action triggered by one pull-request label. Implementations must be
/// idempotent per (label, head SHA): GitHub is known to redeliver webhooks.
#[async_trait]
pub trait LabelHandler: Send + Sync {
    fn label(&self) -> &'static str;

    async fn run(
        &self,
        event: &PullRequestEvent,
        client: &Octocrab,
        agent: &dyn Agent,
    ) -> Result<String, AppError>;
}

/// Immutable mapping from label name to handler.
pub struct LabelHandlers {
    handlers: HashMap<&'static str, Arc<dyn LabelHandler>>,
}

impl LabelHandlers {
    pub fn new(handlers: impl IntoIterator<Item = Arc<dyn LabelHandler>>) -> Self {
        Self { handlers: handlers.into_iter().map(|h| (h.label(), h)).collect() }
    }

    /// The handler set shipped by default.
    pub fn defaults() -> Self { Self::new([Arc::new(TestDeploy) as Arc<dyn LabelHandler>]) }

    pub fn get(&self, name: &str) -> Option<&dyn LabelHandler> {
        self.handlers.get(name).map(|h| h.as_ref())
    }

    pub fn len(&self) -> usize { self.handlers.len() }

    pub fn is_empty(&self) -> bool { self.handlers.is_empty() }
}

/// Deploys the pull request's recipe to the test environment: resolves the
/// PR's dependency manifest, then asks the agent to bake the recipe at the
/// head commit.
pub struct TestDeploy;

#[async_trait]
impl LabelHandler for TestDeploy {
    fn label(&self) -> &'static str { "test-deploy" }

    async fn run(
        &self,
        event: &PullRequestEvent,
        client: &Octocrab,
        agent: &dyn Agent,
    ) -> Result<String, AppError> {
        let pkgs = reqs::fetch_requirements(client, &event.head.repo, &event.head.sha).await?;
        let cmd = bake_command(&event.head.repo.html_url, &event.head.sha);
        agent.invoke(&cmd, &pkgs).await
    }
}

pub fn bake_command(html_url: &str, head_sha: &str) -> Vec<String> {
    vec![
        "bake".to_string(),
        format!("--repo={html_url}"),
        format!("--ref={head_sha}"),
        "--prune".to_string(),
        "--json".to_string(),
    ]
}
