use std::path::PathBuf;

use clap::Parser;

use crate::scanner::ScanRequest;

#[derive(Parser, Debug)]
#[command(
    name = "stack-scout",
    about = "Find dependency manifests in a repository or image and submit them for stack analysis",
    version
)]
pub struct Cli {
    /// Container image to inspect for base OS and origin repository
    #[arg(long, value_name = "IMAGE")]
    pub image: Option<String>,

    /// Repository URL (https://github.com/owner/repo, git@github.com:owner/repo.git or owner/repo)
    #[arg(long = "git-url", value_name = "URL")]
    pub git_url: Option<String>,

    /// Config file [default: ./.stack-scout/config.toml, fallback ~/.config/stack-scout/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Report format
    #[arg(long, default_value = "terminal", value_name = "FORMAT")]
    pub report: ReportFormat,

    /// Log output format (logs go to stderr)
    #[arg(long = "log-format", default_value = "pretty", value_name = "FORMAT")]
    pub log_format: LogFormat,

    /// Show submitted manifests too (not just failures) and debug logs
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print summary line
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    pub fn scan_request(&self) -> ScanRequest {
        ScanRequest {
            image: self.image.clone(),
            git_url: self.git_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Terminal,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}
