//! Submission of manifests to the stack-analysis service.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::models::{AnalysisOutcome, ManifestContent, ManifestDescriptor};
use crate::transport::HttpTransport;

const STACK_ANALYSES_PATH: &str = "/api/v1/stack-analyses";
const MANIFEST_FIELD: &str = "manifest[]";
const FILE_PATH_FIELD: &str = "filePath[]";
/// The service expects a client-side path for each manifest; none exists here.
const SYNTHETIC_FILE_PATH: &str = "/home/JohnDoe";

/// Submits one manifest and reports what happened.
///
/// Implementations never fail: every error is folded into
/// [`AnalysisOutcome::Failure`] so one bad manifest cannot abort a batch.
#[async_trait]
pub trait AnalysisDispatcher: Send + Sync {
    async fn dispatch(&self, content: ManifestContent, auth_token: Option<&str>) -> AnalysisOutcome;
}

/// [`AnalysisDispatcher`] for the HTTP stack-analysis API.
pub struct StackAnalysisClient {
    transport: HttpTransport,
    endpoint: String,
}

impl StackAnalysisClient {
    pub fn new(transport: HttpTransport, base_url: &str) -> Self {
        StackAnalysisClient {
            transport,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), STACK_ANALYSES_PATH),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn build_form(content: &ManifestContent) -> Form {
    let manifest = Part::bytes(content.bytes.clone()).file_name(content.descriptor.filename.clone());
    Form::new()
        .part(MANIFEST_FIELD, manifest)
        .text(FILE_PATH_FIELD, SYNTHETIC_FILE_PATH)
}

/// Map a completed HTTP exchange onto an outcome.
fn classify_response(descriptor: ManifestDescriptor, status: u16, body: &[u8]) -> AnalysisOutcome {
    if !(200..300).contains(&status) {
        return AnalysisOutcome::Failure {
            descriptor,
            reason: ErrorKind::AnalysisRejected(status),
        };
    }

    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(response) => AnalysisOutcome::Success {
            descriptor,
            response,
        },
        Err(_) => AnalysisOutcome::Failure {
            descriptor,
            reason: ErrorKind::MalformedResponse,
        },
    }
}

#[async_trait]
impl AnalysisDispatcher for StackAnalysisClient {
    async fn dispatch(&self, content: ManifestContent, auth_token: Option<&str>) -> AnalysisOutcome {
        let endpoint = self.endpoint.as_str();
        let result = self
            .transport
            .send(|client| {
                let request = client.post(endpoint).multipart(build_form(&content));
                match auth_token {
                    Some(token) => request.bearer_auth(token),
                    None => request,
                }
            })
            .await;

        let descriptor = content.descriptor;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(manifest = %descriptor.download_url, error = %e, "stack analysis request failed");
                return AnalysisOutcome::Failure {
                    descriptor,
                    reason: ErrorKind::TransportError,
                };
            }
        };

        let status = response.status().as_u16();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                warn!(manifest = %descriptor.download_url, error = %e, "stack analysis body could not be read");
                return AnalysisOutcome::Failure {
                    descriptor,
                    reason: ErrorKind::TransportError,
                };
            }
        };

        let outcome = classify_response(descriptor, status, &body);
        match &outcome {
            AnalysisOutcome::Success { descriptor, .. } => {
                debug!(manifest = %descriptor.download_url, status, "stack analysis accepted");
            }
            AnalysisOutcome::Failure { descriptor, reason } => {
                warn!(manifest = %descriptor.download_url, status, reason = %reason, "stack analysis failed");
            }
        }
        outcome
    }
}
