//! The manifest discovery and dispatch pipeline.
//!
//! # Flow
//! 1. Parse the repository URL ([`parse_repository_url`]); absent or
//!    unparseable input ends the run with no outcomes.
//! 2. Resolve the default-branch tree ([`TreeResolver`]); a failure ends the
//!    run with no outcomes and records the cause in `repository_error`.
//! 3. Filter the tree for manifests ([`ManifestFilter`]).
//! 4. Fetch and dispatch every manifest concurrently, at most
//!    `max_in_flight` at a time; each manifest yields exactly one outcome.
//! 5. Return the outcomes in filter order.
//!
//! Cancelling the token at any await point drops the pending work and
//! returns a [`RunStatus::Cancelled`] result with no outcomes.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::analysis::AnalysisDispatcher;
use crate::detector::ManifestFilter;
use crate::github::fetch::ManifestFetcher;
use crate::github::repo_ref::parse_repository_url;
use crate::github::tree::TreeResolver;
use crate::models::{AnalysisOutcome, ManifestDescriptor, PipelineResult, RunStatus};

pub struct ManifestPipeline {
    resolver: Arc<dyn TreeResolver>,
    filter: ManifestFilter,
    fetcher: Arc<dyn ManifestFetcher>,
    dispatcher: Arc<dyn AnalysisDispatcher>,
    auth_token: Option<String>,
    max_in_flight: usize,
}

impl ManifestPipeline {
    pub fn new(
        resolver: Arc<dyn TreeResolver>,
        filter: ManifestFilter,
        fetcher: Arc<dyn ManifestFetcher>,
        dispatcher: Arc<dyn AnalysisDispatcher>,
        auth_token: Option<String>,
        max_in_flight: usize,
    ) -> Self {
        ManifestPipeline {
            resolver,
            filter,
            fetcher,
            dispatcher,
            auth_token,
            max_in_flight: max_in_flight.max(1),
        }
    }

    #[instrument(skip(self, cancel))]
    pub async fn run(&self, repo_url: Option<&str>, cancel: &CancellationToken) -> PipelineResult {
        let Some(url) = repo_url else {
            debug!("no repository url given");
            return PipelineResult::empty(None);
        };
        let repository_url = Some(url.to_string());

        let Some(repo) = parse_repository_url(url) else {
            warn!(url, "repository url could not be parsed");
            return PipelineResult::empty(repository_url);
        };

        let resolved = tokio::select! {
            _ = cancel.cancelled() => {
                warn!(repo = %repo, "cancelled while resolving tree");
                return PipelineResult::cancelled(repository_url);
            }
            resolved = self.resolver.resolve(&repo) => resolved,
        };

        let entries = match resolved {
            Ok(entries) => entries,
            Err(reason) => {
                warn!(repo = %repo, reason = %reason, "repository tree could not be resolved");
                return PipelineResult {
                    repository_error: Some(reason),
                    ..PipelineResult::empty(repository_url)
                };
            }
        };

        let descriptors = self.filter.filter(&entries, &repo);
        info!(
            repo = %repo,
            entries = entries.len(),
            manifests = descriptors.len(),
            "discovered manifests"
        );

        let outcomes = tokio::select! {
            _ = cancel.cancelled() => {
                warn!(repo = %repo, "cancelled while dispatching manifests");
                return PipelineResult::cancelled(repository_url);
            }
            outcomes = self.dispatch_all(descriptors) => outcomes,
        };

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(
            repo = %repo,
            succeeded = outcomes.len() - failed,
            failed,
            "stack analysis finished"
        );

        PipelineResult {
            status: RunStatus::Completed,
            outcomes,
            ..PipelineResult::empty(repository_url)
        }
    }

    /// Fan out over `descriptors` and join on every outcome, in input order.
    async fn dispatch_all(&self, descriptors: Vec<ManifestDescriptor>) -> Vec<AnalysisOutcome> {
        let limiter = Semaphore::new(self.max_in_flight);
        let tasks = descriptors
            .into_iter()
            .map(|descriptor| self.process(descriptor, &limiter));
        join_all(tasks).await
    }

    async fn process(&self, descriptor: ManifestDescriptor, limiter: &Semaphore) -> AnalysisOutcome {
        // `limiter` lives in `dispatch_all` and is never closed, so acquiring
        // always yields a permit.
        let _permit = limiter.acquire().await.ok();

        let content = match self.fetcher.fetch(&descriptor).await {
            Ok(content) => content,
            Err(reason) => return AnalysisOutcome::Failure { descriptor, reason },
        };

        self.dispatcher
            .dispatch(content, self.auth_token.as_deref())
            .await
    }
}
