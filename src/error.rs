//! Error taxonomy shared by every component boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a remote step failed.
///
/// Component boundaries return this instead of an opaque error so the
/// orchestrator can decide, per variant, whether a failure is terminal for the
/// run or local to one manifest. It is serialized into the report as
/// `{"kind": "...", "status": <code>}`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum ErrorKind {
    /// The remote resource does not exist.
    #[error("remote resource not found")]
    NotFound,

    /// A trusted remote answered with an unexpected shape.
    #[error("malformed response from remote")]
    MalformedResponse,

    /// Connection, DNS or timeout failure.
    #[error("transport error")]
    TransportError,

    /// The raw-content host answered with a non-success status.
    #[error("upstream unavailable (HTTP {0})")]
    UpstreamUnavailable(u16),

    /// The analysis service explicitly rejected the submission.
    #[error("analysis rejected (HTTP {0})")]
    AnalysisRejected(u16),

    /// The caller aborted the run.
    #[error("cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Classify a request-level failure from the HTTP client.
    ///
    /// Everything that never produced a response is a transport error; a body
    /// that fails to decode is a malformed response.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            ErrorKind::MalformedResponse
        } else {
            ErrorKind::TransportError
        }
    }
}
