use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// A hosted repository, identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// One node of a repository tree at a fixed commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub sha: String,
    /// Provider node type: `blob`, `tree` or `commit`.
    pub kind: Option<String>,
}

impl TreeEntry {
    pub fn is_directory(&self) -> bool {
        self.kind.as_deref() == Some("tree")
    }
}

/// A recognized manifest file inside a repository tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDescriptor {
    pub filename: String,
    pub download_url: String,
    /// Parent directory of the manifest, empty for the repository root.
    pub dirpath: String,
}

/// The fetched body of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestContent {
    pub descriptor: ManifestDescriptor,
    pub bytes: Vec<u8>,
}

/// Result of submitting one manifest for stack analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Success {
        descriptor: ManifestDescriptor,
        response: serde_json::Value,
    },
    Failure {
        descriptor: ManifestDescriptor,
        reason: ErrorKind,
    },
}

impl AnalysisOutcome {
    pub fn descriptor(&self) -> &ManifestDescriptor {
        match self {
            AnalysisOutcome::Success { descriptor, .. } => descriptor,
            AnalysisOutcome::Failure { descriptor, .. } => descriptor,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisOutcome::Success { .. })
    }
}

/// Facts read from a container image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ImageFacts {
    /// `None` when the image carries no readable release file.
    pub base_os: Option<String>,
    pub origin_repo_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Everything one scan produced.
///
/// `outcomes` is empty when no manifest was found, when the repository could
/// not be resolved (see `repository_error`) or when the run was cancelled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    /// The requested image, kept even when inspection failed.
    pub image: Option<String>,
    #[serde(flatten)]
    pub image_facts: Option<ImageFacts>,
    #[serde(rename = "git-url")]
    pub repository_url: Option<String>,
    pub status: RunStatus,
    #[serde(rename = "repository-error", skip_serializing_if = "Option::is_none")]
    pub repository_error: Option<ErrorKind>,
    #[serde(rename = "stack-requests")]
    pub outcomes: Vec<AnalysisOutcome>,
}

impl PipelineResult {
    pub fn empty(repository_url: Option<String>) -> Self {
        PipelineResult {
            image: None,
            image_facts: None,
            repository_url,
            status: RunStatus::Completed,
            repository_error: None,
            outcomes: Vec::new(),
        }
    }

    pub fn cancelled(repository_url: Option<String>) -> Self {
        PipelineResult {
            status: RunStatus::Cancelled,
            ..Self::empty(repository_url)
        }
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }
}
