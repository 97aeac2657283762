pub mod payload;
pub mod reqs;
pub mod webhook;

use anyhow::{Context, Result};
use forge_dispatch_core::{config::GitHubAppConfig, AppError};
use octocrab::Octocrab;

/// GitHub App identity. Holds the App-authenticated client from which
/// installation-scoped clients are minted, one per webhook delivery.
pub struct GitHub {
    app_client: Octocrab,
    pub app_name: String,
}

impl GitHub {
    pub fn new(config: &GitHubAppConfig) -> Result<Self> { Self::build(config, None) }

    /// Point the client at a non-default API root (GitHub Enterprise, or a
    /// mock server in tests).
    pub fn with_base_uri(config: &GitHubAppConfig, base_uri: &str) -> Result<Self> {
        Self::build(config, Some(base_uri))
    }

    fn build(config: &GitHubAppConfig, base_uri: Option<&str>) -> Result<Self> {
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(config.private_key.expose().as_bytes())
            .context("Failed to parse GitHub App private key")?;
        let mut builder = Octocrab::builder().app(config.id.into(), key);
        if let Some(uri) = base_uri {
            builder = builder.base_uri(uri).context("Invalid GitHub API base URI")?;
        }
        let app_client = builder.build().context("Failed to create GitHub client")?;
        Ok(Self { app_client, app_name: config.name.clone() })
    }

    /// Mint a client scoped to one installation. The installation token is
    /// exchanged lazily on the client's first request and lives only for the
    /// current delivery; nothing is cached across requests.
    pub fn installation_client(&self, installation_id: u64) -> Result<Octocrab, AppError> {
        self.app_client.installation(installation_id.into()).map_err(AppError::from)
    }
}
