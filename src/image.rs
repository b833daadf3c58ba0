//! Container image inspection through the local Docker daemon.
//!
//! The image is pulled, its origin label read, a throwaway container run to
//! print the release files, and then the container and image are removed
//! again whatever happened in between, including cancellation of the scan.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use bollard::container::{
    Config, LogsOptions, RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::{CreateImageOptions, RemoveImageOptions};
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::ErrorKind;
use crate::models::ImageFacts;

/// Labels that may carry the source repository, in order of preference.
const ORIGIN_LABELS: [&str; 3] = [
    "git-url",
    "org.opencontainers.image.source",
    "io.openshift.build.source-location",
];

/// Release files printed by the probe container. `cat` keeps going past a
/// missing file, so whichever exists ends up on stdout.
const RELEASE_FILES: [&str; 2] = ["/etc/redhat-release", "/etc/os-release"];

/// Determines the base OS and originating repository of an image.
#[async_trait]
pub trait ImageInspector: Send + Sync {
    async fn inspect(&self, image: &str) -> Result<ImageFacts, ErrorKind>;
}

/// Split an image reference into the `fromImage` and `tag` the pull API wants.
///
/// Untagged references get `latest`; an empty tag would pull every tag.
fn split_reference(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    let last_segment_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[last_segment_start..].rfind(':') {
        Some(i) => {
            let colon = last_segment_start + i;
            (&image[..colon], &image[colon + 1..])
        }
        None => (image, "latest"),
    }
}

fn origin_from_labels(labels: Option<HashMap<String, String>>) -> Option<String> {
    let labels = labels?;
    ORIGIN_LABELS
        .iter()
        .filter_map(|key| labels.get(*key))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Pick the OS name out of the probe output.
///
/// `/etc/redhat-release` is a single free-text line; `/etc/os-release` is
/// `KEY=value` pairs where `PRETTY_NAME` is the readable name.
fn base_os_from_release(output: &str) -> Option<String> {
    let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = lines.next()?;
    if !first.contains('=') {
        return Some(first.to_string());
    }

    std::iter::once(first)
        .chain(lines)
        .find_map(|line| line.strip_prefix("PRETTY_NAME="))
        .map(|v| v.trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

fn map_docker_error(err: bollard::errors::Error) -> ErrorKind {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => ErrorKind::NotFound,
        bollard::errors::Error::DockerResponseServerError { .. } => ErrorKind::MalformedResponse,
        _ => ErrorKind::TransportError,
    }
}

/// Runs an async cleanup exactly once, on a spawned task so it survives the
/// cancellation of whoever owns the guard.
///
/// [`CleanupGuard::finish`] runs it and waits; dropping the guard unfinished
/// runs it in the background.
struct CleanupGuard<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    cleanup: Option<F>,
}

impl<F> CleanupGuard<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    fn new(cleanup: F) -> Self {
        CleanupGuard {
            cleanup: Some(cleanup),
        }
    }

    async fn finish(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            if let Err(e) = tokio::spawn(cleanup).await {
                warn!(error = %e, "cleanup task failed");
            }
        }
    }
}

impl<F> Drop for CleanupGuard<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    fn drop(&mut self) {
        let Some(cleanup) = self.cleanup.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("interrupted, cleaning up in the background");
                handle.spawn(cleanup);
            }
            Err(_) => warn!("no runtime available, docker cleanup skipped"),
        }
    }
}

async fn remove_container(docker: Docker, id: String) {
    let options = RemoveContainerOptions {
        force: true,
        ..Default::default()
    };
    match docker.remove_container(&id, Some(options)).await {
        Ok(()) => debug!(container = %id, "probe container removed"),
        Err(e) => warn!(container = %id, error = %e, "probe container was not removed"),
    }
}

async fn remove_image(docker: Docker, image: String) {
    let options = RemoveImageOptions {
        force: true,
        ..Default::default()
    };
    match docker.remove_image(&image, Some(options), None).await {
        Ok(_) => debug!(image = %image, "image removed"),
        // Nothing to remove when the pull never completed.
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => debug!(image = %image, "image not present, nothing to remove"),
        Err(e) => warn!(image = %image, error = %e, "image was not removed"),
    }
}

/// Combine the origin label with the release probe result.
///
/// A failed probe (no `cat` in scratch or distroless images) leaves the base
/// OS unknown but keeps the label.
fn assemble_facts(
    image: &str,
    origin_repo_url: Option<String>,
    probe: Result<String, ErrorKind>,
) -> ImageFacts {
    let base_os = match probe {
        Ok(output) => base_os_from_release(&output),
        Err(reason) => {
            warn!(image, reason = %reason, "release probe failed");
            None
        }
    };
    if base_os.is_none() {
        warn!(image, "base OS could not be determined");
    }

    ImageFacts {
        base_os,
        origin_repo_url,
    }
}

/// [`ImageInspector`] that talks to the local Docker (or Podman) socket.
pub struct DockerImageInspector {
    docker: Docker,
}

impl DockerImageInspector {
    pub fn connect_local() -> Result<Self, bollard::errors::Error> {
        Ok(DockerImageInspector {
            docker: Docker::connect_with_local_defaults()?,
        })
    }

    async fn pull(&self, image: &str) -> Result<(), ErrorKind> {
        let (from_image, tag) = split_reference(image);
        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };

        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(step) = progress.next().await {
            step.map_err(|e| {
                warn!(image, error = %e, "image pull failed");
                map_docker_error(e)
            })?;
        }
        debug!(image, "image pulled");
        Ok(())
    }

    async fn origin_label(&self, image: &str) -> Result<Option<String>, ErrorKind> {
        let details = self.docker.inspect_image(image).await.map_err(|e| {
            warn!(image, error = %e, "image inspection failed");
            map_docker_error(e)
        })?;
        Ok(origin_from_labels(details.config.and_then(|c| c.labels)))
    }

    /// Run the release probe in a throwaway container and return its stdout.
    async fn probe_release(&self, image: &str) -> Result<String, ErrorKind> {
        let mut cmd = vec!["cat".to_string()];
        cmd.extend(RELEASE_FILES.iter().map(|f| f.to_string()));
        let config = Config {
            image: Some(image.to_string()),
            cmd: Some(cmd),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container::<String, String>(None, config)
            .await
            .map_err(|e| {
                warn!(image, error = %e, "probe container could not be created");
                map_docker_error(e)
            })?;

        let cleanup = CleanupGuard::new(remove_container(
            self.docker.clone(),
            container.id.clone(),
        ));
        let output = self.run_and_capture(&container.id).await;
        cleanup.finish().await;

        output
    }

    async fn run_and_capture(&self, id: &str) -> Result<String, ErrorKind> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_docker_error)?;

        let mut wait = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);
        while let Some(exit) = wait.next().await {
            // A missing release file makes `cat` exit non-zero; stdout is still usable.
            if let Err(e) = exit {
                debug!(container = id, error = %e, "probe exited with error");
                break;
            }
        }

        let options = LogsOptions::<String> {
            stdout: true,
            ..Default::default()
        };
        let mut logs = self.docker.logs(id, Some(options));
        let mut output = String::new();
        while let Some(chunk) = logs.next().await {
            output.push_str(&chunk.map_err(map_docker_error)?.to_string());
        }
        Ok(output)
    }

    async fn inspect_pulled(&self, image: &str) -> Result<ImageFacts, ErrorKind> {
        let origin_repo_url = self.origin_label(image).await?;
        let probe = self.probe_release(image).await;
        Ok(assemble_facts(image, origin_repo_url, probe))
    }
}

#[async_trait]
impl ImageInspector for DockerImageInspector {
    async fn inspect(&self, image: &str) -> Result<ImageFacts, ErrorKind> {
        let cleanup = CleanupGuard::new(remove_image(self.docker.clone(), image.to_string()));
        let facts = match self.pull(image).await {
            Ok(()) => self.inspect_pulled(image).await,
            Err(reason) => Err(reason),
        };
        cleanup.finish().await;

        if let Ok(facts) = &facts {
            info!(
                image,
                base_os = facts.base_os.as_deref().unwrap_or("-"),
                origin = facts.origin_repo_url.as_deref().unwrap_or("-"),
                "inspected image"
            );
        }
        facts
    }
}
