mod cloud_run;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
pub use cloud_run::CloudRunAgent;
use forge_dispatch_core::{config::AgentConfig, AppError};

/// Capability contract for a remote execution backend: run a
/// `pangeo-forge-runner` command after ensuring the given packages are
/// installed there, and return the captured stdout.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn invoke(&self, cmd: &[String], pkgs: &[String]) -> Result<String, AppError>;
}

/// Instantiate the backend selected by configuration. Callers depend only on
/// the [`Agent`] interface.
pub fn agent_from_config(config: &AgentConfig) -> Result<Arc<dyn Agent>> {
    match config {
        AgentConfig::CloudRun(cloud_run) => Ok(Arc::new(CloudRunAgent::new(
            cloud_run.service_url.clone(),
            cloud_run.invoker_keyfile.clone(),
            cloud_run.env.clone(),
        )?)),
    }
}
