use std::path::PathBuf;

use anyhow::Result;
use log::debug;

use crate::clients::github::DEFAULT_API;

#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: Option<String>,
    pub github_api: String,
    /// Serve entities from this JSON file instead of GitHub.
    pub snapshot: Option<PathBuf>,
}

impl Config {
    /// Load config from the environment, falling back to git config for the token.
    pub fn load() -> Result<Self> {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok());
        if config.github_token.is_none() {
            config.github_token = git_config_token()?;
        }
        Ok(config)
    }

    /// Build a config from an environment lookup (useful for tests)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            github_token: non_empty("GITHUB_TOKEN").or_else(|| non_empty("GH_TOKEN")),
            github_api: non_empty("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_API.to_string()),
            snapshot: non_empty("REPO_UTIL_SNAPSHOT").map(PathBuf::from),
        }
    }
}

/// Read `repo-util.githubToken` from git config
fn git_config_token() -> Result<Option<String>> {
    let output = match std::process::Command::new("git")
        .args(["config", "--get", "repo-util.githubToken"])
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            debug!("git config unavailable: {}", e);
            return Ok(None);
        }
    };

    if !output.status.success() {
        return Ok(None);
    }

    let token = String::from_utf8(output.stdout)?.trim().to_string();
    Ok((!token.is_empty()).then_some(token))
}
