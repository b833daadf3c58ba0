use regex::Regex;

use crate::models::RepositoryRef;

const HOSTED_URL_PATTERN: &str =
    r"^(?:git\+)?(?:(?:https?|git|ssh)://)?(?:[^@/\s]+@)?(?:www\.)?github\.com[:/]([^/\s]+)/([^/\s?#]+)";
const SHORTHAND_PATTERN: &str = r"^([A-Za-z0-9_.\-]+)/([A-Za-z0-9_.\-]+)$";

/// Parse a repository URL into owner and name.
///
/// Accepts `https://github.com/owner/repo`, scheme-less `github.com/owner/repo`,
/// SSH `git@github.com:owner/repo.git`, `git+https://...` and the bare
/// `owner/repo` shorthand. A trailing `.git` and anything after the repository
/// segment (`/tree/master/...`) are ignored. Returns `None` for anything else.
pub fn parse_repository_url(url: &str) -> Option<RepositoryRef> {
    let url = url.trim();
    let hosted = Regex::new(HOSTED_URL_PATTERN).ok()?;
    let shorthand = Regex::new(SHORTHAND_PATTERN).ok()?;
    let caps = hosted.captures(url).or_else(|| shorthand.captures(url))?;

    let owner = caps.get(1)?.as_str();
    let name = caps.get(2)?.as_str();
    let name = name.strip_suffix(".git").unwrap_or(name);

    if owner.is_empty() || name.is_empty() {
        return None;
    }

    Some(RepositoryRef {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}
