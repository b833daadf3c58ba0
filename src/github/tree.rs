use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Response;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::models::{RepositoryRef, TreeEntry};
use crate::transport::HttpTransport;

/// Resolves the file tree of a repository's default branch.
#[async_trait]
pub trait TreeResolver: Send + Sync {
    async fn resolve(&self, repo: &RepositoryRef) -> Result<Vec<TreeEntry>, ErrorKind>;
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: Option<RefObject>,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Option<Vec<RawTreeEntry>>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct RawTreeEntry {
    path: Option<String>,
    #[serde(default)]
    sha: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Extract the head commit SHA from a `git/refs/heads/{branch}` body.
fn parse_ref_sha(body: &[u8]) -> Result<String, ErrorKind> {
    let parsed: RefResponse =
        serde_json::from_slice(body).map_err(|_| ErrorKind::MalformedResponse)?;
    parsed
        .object
        .and_then(|o| o.sha)
        .filter(|sha| !sha.is_empty())
        .ok_or(ErrorKind::MalformedResponse)
}

/// Extract entries from a `git/trees/{sha}` body.
///
/// Entries without a `path` are skipped; the `bool` is the provider's
/// `truncated` flag.
fn parse_tree(body: &[u8]) -> Result<(Vec<TreeEntry>, bool), ErrorKind> {
    let parsed: TreeResponse =
        serde_json::from_slice(body).map_err(|_| ErrorKind::MalformedResponse)?;
    let raw = parsed.tree.ok_or(ErrorKind::MalformedResponse)?;

    let entries = raw
        .into_iter()
        .filter_map(|e| {
            e.path.map(|path| TreeEntry {
                path,
                sha: e.sha,
                kind: e.kind,
            })
        })
        .collect();

    Ok((entries, parsed.truncated))
}

/// [`TreeResolver`] backed by the GitHub REST API.
pub struct GithubTreeResolver {
    transport: HttpTransport,
    api_base: String,
    branch: String,
    token: Option<String>,
}

impl GithubTreeResolver {
    pub fn new(
        transport: HttpTransport,
        api_base: &str,
        branch: &str,
        token: Option<String>,
    ) -> Self {
        GithubTreeResolver {
            transport,
            api_base: api_base.trim_end_matches('/').to_string(),
            branch: branch.to_string(),
            token,
        }
    }

    fn ref_url(&self, repo: &RepositoryRef) -> String {
        format!(
            "{}/repos/{}/{}/git/refs/heads/{}",
            self.api_base, repo.owner, repo.name, self.branch
        )
    }

    fn tree_url(&self, repo: &RepositoryRef, sha: &str) -> String {
        format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base, repo.owner, repo.name, sha
        )
    }

    /// GET `url`; any non-success status is `NotFound`.
    async fn get_body(&self, url: &str) -> Result<Vec<u8>, ErrorKind> {
        let response: Response = self
            .transport
            .send(|client| {
                let request = client
                    .get(url)
                    .header(ACCEPT, "application/vnd.github+json");
                match &self.token {
                    Some(token) => request.bearer_auth(token),
                    None => request,
                }
            })
            .await
            .map_err(|e| {
                warn!(url, error = %e, "hosting provider request failed");
                ErrorKind::from_reqwest(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "hosting provider returned non-success");
            return Err(ErrorKind::NotFound);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ErrorKind::from_reqwest(&e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl TreeResolver for GithubTreeResolver {
    async fn resolve(&self, repo: &RepositoryRef) -> Result<Vec<TreeEntry>, ErrorKind> {
        let body = self.get_body(&self.ref_url(repo)).await?;
        let sha = parse_ref_sha(&body)?;
        debug!(repo = %repo, branch = %self.branch, sha = %sha, "resolved head commit");

        let body = self.get_body(&self.tree_url(repo, &sha)).await?;
        let (entries, truncated) = parse_tree(&body)?;
        if truncated {
            warn!(repo = %repo, entries = entries.len(), "tree listing was truncated by the provider");
        }

        Ok(entries)
    }
}
