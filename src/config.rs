use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Root configuration structure, deserialized from `.stack-scout/config.toml`.
///
/// Every section is optional in the file; missing fields fall back to the
/// built-in defaults and are then overridden by environment variables
/// (see [`Config::apply_env`]).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisConfig,
    pub github: GithubConfig,
    pub manifests: ManifestConfig,
    pub http: HttpConfig,
    pub pipeline: PipelineConfig,
}

/// Where manifests are submitted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Base URL of the stack-analysis service, without the API path.
    pub base_url: String,
    /// Bearer token sent with every submission, if set.
    pub token: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            base_url: format!("http://{DEFAULT_COREAPI_HOST}:{DEFAULT_COREAPI_PORT}"),
            token: None,
        }
    }
}

const DEFAULT_COREAPI_HOST: &str = "bayesian-api";
const DEFAULT_COREAPI_PORT: &str = "5000";

/// Hosting-provider endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_base: String,
    pub raw_base: String,
    pub default_branch: String,
    /// Optional API token; raises the provider's rate limit.
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        GithubConfig {
            api_base: "https://api.github.com".to_string(),
            raw_base: "https://raw.githubusercontent.com".to_string(),
            default_branch: "master".to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Exact filenames treated as dependency manifests.
    pub recognized: Vec<String>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        ManifestConfig {
            recognized: vec![
                "pom.xml".to_string(),
                "package.json".to_string(),
                "requirements.txt".to_string(),
            ],
        }
    }
}

/// Outbound HTTP behaviour shared by every remote call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = run once).
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub backoff_base_ms: u64,
    /// Response statuses considered transient.
    pub statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            backoff_base_ms: 200,
            statuses: vec![408, 500, 502, 503, 504],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum manifests fetched and dispatched at the same time.
    pub max_in_flight: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig { max_in_flight: 4 }
    }
}

impl Config {
    /// Override fields from environment variables.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("STACK_ANALYSIS_URL") {
            self.analysis.base_url = url;
        } else {
            let host = lookup("BAYESIAN_COREAPI_HTTP_SERVICE_HOST");
            let port = lookup("BAYESIAN_COREAPI_HTTP_SERVICE_PORT");
            if host.is_some() || port.is_some() {
                self.analysis.base_url = format!(
                    "http://{}:{}",
                    host.as_deref().unwrap_or(DEFAULT_COREAPI_HOST),
                    port.as_deref().unwrap_or(DEFAULT_COREAPI_PORT)
                );
            }
        }
        if let Some(token) = lookup("STACK_ANALYSIS_TOKEN") {
            self.analysis.token = Some(token);
        }

        if let Some(v) = lookup("GITHUB_API_URL") {
            self.github.api_base = v;
        }
        if let Some(v) = lookup("GITHUB_RAW_URL") {
            self.github.raw_base = v;
        }
        if let Some(v) = lookup("GITHUB_DEFAULT_BRANCH") {
            self.github.default_branch = v;
        }
        if let Some(v) = lookup("GITHUB_TOKEN") {
            self.github.token = Some(v);
        }

        if let Some(v) = lookup("STACK_SCOUT_MANIFESTS") {
            self.manifests.recognized = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(v) = lookup("STACK_SCOUT_TIMEOUT_SECS") {
            self.http.timeout_secs = parse_env("STACK_SCOUT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("STACK_SCOUT_RETRIES") {
            self.http.retry.max_retries = parse_env("STACK_SCOUT_RETRIES", &v)?;
        }
        if let Some(v) = lookup("STACK_SCOUT_BACKOFF_MS") {
            self.http.retry.backoff_base_ms = parse_env("STACK_SCOUT_BACKOFF_MS", &v)?;
        }
        if let Some(v) = lookup("STACK_SCOUT_MAX_IN_FLIGHT") {
            self.pipeline.max_in_flight = parse_env("STACK_SCOUT_MAX_IN_FLIGHT", &v)?;
        }

        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_in_flight == 0 {
            bail!("pipeline.max_in_flight must be at least 1");
        }
        if self.http.timeout_secs == 0 {
            bail!("http.timeout_secs must be at least 1");
        }
        if self.manifests.recognized.is_empty() {
            bail!("manifests.recognized must name at least one file");
        }
        Ok(())
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {name}: {value:?}"))
}

/// Load the configuration, searching in order:
///
/// 1. `config_override`: path passed via `--config`
/// 2. `./.stack-scout/config.toml`
/// 3. `~/.config/stack-scout/config.toml`
/// 4. Built-in [`Config::default`]
///
/// Environment overrides are applied on top and the result is validated.
pub fn load_config(working_dir: &Path, config_override: Option<&Path>) -> Result<Config> {
    let mut config = read_config_file(working_dir, config_override)?;
    config.apply_env(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

fn read_config_file(working_dir: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        return parse_file(path);
    }

    let project_config = working_dir.join(".stack-scout").join("config.toml");
    if project_config.exists() {
        return parse_file(&project_config);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".config").join("stack-scout").join("config.toml");
        if home_config.exists() {
            return parse_file(&home_config);
        }
    }

    Ok(Config::default())
}

fn parse_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid config file {}", path.display()))
}
