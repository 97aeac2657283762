use forge_dispatch_core::AppError;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    pub id: u64,
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadRepo {
    pub html_url: String,
    pub name: String,
    pub owner: Owner,
}

impl HeadRepo {
    /// Route for the recursive tree listing of one commit, relative to the
    /// API root.
    pub fn tree_route(&self, sha: &str) -> String {
        format!("/repos/{}/{}/git/trees/{}?recursive=1", self.owner.login, self.name, sha)
    }

    /// Route for fetching one blob's content.
    pub fn blob_route(&self, sha: &str) -> String {
        format!("/repos/{}/{}/git/blobs/{}", self.owner.login, self.name, sha)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Head {
    pub sha: String,
    pub repo: HeadRepo,
}

#[derive(Deserialize)]
struct RawPullRequest {
    head: Head,
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Deserialize)]
struct RawEvent {
    sender: Sender,
    pull_request: RawPullRequest,
    label: Option<Label>,
}

/// Typed view of a `pull_request` webhook payload.
///
/// `triggering_label` is set only for `labeled` actions; for every other
/// action the actionable label set is the pull request's full label list.
#[derive(Debug, Clone)]
pub struct PullRequestEvent {
    pub sender: Sender,
    pub head: Head,
    pub labels: Vec<Label>,
    pub triggering_label: Option<Label>,
}

impl PullRequestEvent {
    /// Pure transformation from the generic payload document. Fails with a
    /// `Validation` error when required fields are absent or malformed.
    pub fn from_payload(action: &str, payload: &serde_json::Value) -> Result<Self, AppError> {
        let raw: RawEvent = serde_json::from_value(payload.clone())
            .map_err(|e| AppError::validation(format!("malformed pull_request payload: {e}")))?;
        if raw.pull_request.head.sha.is_empty() {
            return Err(AppError::validation("pull_request head has an empty sha"));
        }
        let triggering_label = if action == "labeled" {
            let label = raw
                .label
                .ok_or_else(|| AppError::validation("labeled event is missing the label field"))?;
            if !raw.pull_request.labels.contains(&label) {
                return Err(AppError::validation(format!(
                    "label '{}' is not present on the pull request",
                    label.name
                )));
            }
            Some(label)
        } else {
            None
        };
        Ok(Self {
            sender: raw.sender,
            head: raw.pull_request.head,
            labels: raw.pull_request.labels,
            triggering_label,
        })
    }

    /// Labels relevant to this event: the single triggering label for a
    /// `labeled` action, otherwise all current labels in original order.
    pub fn actionable_labels(&self) -> Vec<&Label> {
        match &self.triggering_label {
            Some(label) => vec![label],
            None => self.labels.iter().collect(),
        }
    }

    /// Registry lookup keys for this event.
    pub fn actionable_label_names(&self) -> Vec<&str> {
        self.actionable_labels().into_iter().map(|l| l.name.as_str()).collect()
    }
}
