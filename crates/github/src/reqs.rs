//! Fetches a pull request's dependency manifest (`requirements.txt`) from
//! the head commit's tree, when one exists.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use forge_dispatch_core::AppError;
use octocrab::Octocrab;
use serde::Deserialize;

use crate::payload::HeadRepo;

const MANIFEST_SUFFIX: &str = "requirements.txt";

#[derive(Debug, Deserialize)]
pub struct GitTree {
    pub tree: Vec<GitTreeItem>,
}

#[derive(Debug, Deserialize)]
pub struct GitTreeItem {
    pub path: String,
    pub sha: String,
}

#[derive(Debug, Deserialize)]
struct GitContent {
    content: String,
    encoding: String,
}

impl GitTree {
    /// At most one entry may end with the manifest filename. More than one
    /// is a configuration error in the target repository, not a transient
    /// fault.
    pub fn manifest_file(&self) -> Result<Option<&GitTreeItem>, AppError> {
        let matching: Vec<&GitTreeItem> =
            self.tree.iter().filter(|item| item.path.ends_with(MANIFEST_SUFFIX)).collect();
        match matching.as_slice() {
            [] => Ok(None),
            [single] => Ok(Some(single)),
            many => {
                let paths: Vec<&str> = many.iter().map(|item| item.path.as_str()).collect();
                Err(AppError::validation(format!(
                    "repository tree contains more than one {MANIFEST_SUFFIX}: {}",
                    paths.join(", ")
                )))
            }
        }
    }
}

fn decode_content(content: &GitContent) -> Result<Vec<String>, AppError> {
    if content.encoding.trim() != "base64" {
        return Err(AppError::validation(format!(
            "blob encoding '{}' is not 'base64'",
            content.encoding
        )));
    }
    // GitHub wraps the base64 payload with newlines
    let stripped: String = content.content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(stripped)
        .map_err(|e| AppError::validation(format!("blob content is not valid base64: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| AppError::validation(format!("manifest is not valid UTF-8: {e}")))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// Resolve the dependency specifiers for one head commit. A tree without a
/// manifest yields an empty list; upstream API failures surface as
/// `RemoteFetch` errors.
pub async fn fetch_requirements(
    client: &Octocrab,
    repo: &HeadRepo,
    head_sha: &str,
) -> Result<Vec<String>, AppError> {
    let tree: GitTree = client.get(repo.tree_route(head_sha), None::<&()>).await?;
    let Some(item) = tree.manifest_file()? else {
        tracing::debug!(repo = %repo.name, sha = head_sha, "no manifest in tree");
        return Ok(Vec::new());
    };
    let content: GitContent = client.get(repo.blob_route(&item.sha), None::<&()>).await?;
    decode_content(&content)
}
