use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::image::ImageInspector;
use crate::models::{PipelineResult, RunStatus};
use crate::pipeline::ManifestPipeline;

/// What to scan: an image, a repository, or both.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScanRequest {
    pub image: Option<String>,
    pub git_url: Option<String>,
}

/// Single entry point tying image inspection to the manifest pipeline.
pub struct Scanner {
    inspector: Option<Arc<dyn ImageInspector>>,
    pipeline: ManifestPipeline,
}

impl Scanner {
    /// `inspector` is `None` when no Docker daemon is available; image
    /// requests are then skipped with a warning.
    pub fn new(inspector: Option<Arc<dyn ImageInspector>>, pipeline: ManifestPipeline) -> Self {
        Scanner {
            inspector,
            pipeline,
        }
    }

    /// Inspect the image (if any), then run the pipeline on the explicit
    /// repository URL or, failing that, the image's origin label.
    pub async fn scan(&self, request: &ScanRequest, cancel: &CancellationToken) -> PipelineResult {
        let image = request.image.as_deref().filter(|i| !i.trim().is_empty());
        let git_url = request.git_url.as_deref().filter(|u| !u.trim().is_empty());

        let image_facts = match (image, &self.inspector) {
            (Some(image), Some(inspector)) => {
                let inspected = tokio::select! {
                    _ = cancel.cancelled() => {
                        warn!(image, "cancelled while inspecting image");
                        return PipelineResult {
                            image: Some(image.to_string()),
                            ..PipelineResult::cancelled(git_url.map(str::to_string))
                        };
                    }
                    inspected = inspector.inspect(image) => inspected,
                };
                match inspected {
                    Ok(facts) => Some(facts),
                    Err(reason) => {
                        warn!(image, reason = %reason, "image inspection failed");
                        None
                    }
                }
            }
            (Some(image), None) => {
                warn!(image, "no image inspector available, skipping image");
                None
            }
            (None, _) => None,
        };

        let repo_url = git_url
            .map(str::to_string)
            .or_else(|| image_facts.as_ref().and_then(|f| f.origin_repo_url.clone()));
        if git_url.is_none() {
            if let Some(url) = &repo_url {
                info!(url = %url, "using repository from image label");
            }
        }

        let mut result = self.pipeline.run(repo_url.as_deref(), cancel).await;
        result.image = image.map(str::to_string);
        if result.status == RunStatus::Completed {
            result.image_facts = image_facts;
        }
        result
    }
}
