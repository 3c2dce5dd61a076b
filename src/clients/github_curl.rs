#![allow(async_fn_in_trait)]

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use tokio::process::Command;
use tracing::trace;

// -----------------------------------------------------------------------------
// Transport trait

/// HTTP requests against the GitHub API. Bodies are JSON text.
#[cfg_attr(test, automock)]
pub trait Transport {
    async fn get(&self, url: &str) -> Result<String>;
    async fn post(&self, url: &str, json_data: &str) -> Result<String>;
    async fn patch(&self, url: &str, json_data: &str) -> Result<String>;
    async fn put(&self, url: &str, json_data: &str) -> Result<String>;
    async fn delete(&self, url: &str) -> Result<()>;

    /// Summary of cached responses, if responses are cached.
    fn statistics(&self) -> Option<String> {
        None
    }
}

// -----------------------------------------------------------------------------
// CurlTransport

/// HTTP client using curl for making GitHub API requests
pub struct CurlTransport {
    token: String,
}

#[derive(Debug, Deserialize)]
struct GitHubError {
    message: String,
    #[serde(default)]
    #[allow(dead_code)]
    documentation_url: Option<String>,
}

impl CurlTransport {
    pub fn new(token: String) -> Self {
        Self { token }
    }

    async fn request(&self, method: &str, url: &str, json_data: Option<&str>) -> Result<String> {
        trace!("{} {}", method, url);
        let authorization = format!("Authorization: Bearer {}", self.token);
        let mut args = vec![
            "-s",
            "-w",
            "\n%{http_code}",
            "-X",
            method,
            "-H",
            authorization.as_str(),
            "-H",
            "Accept: application/vnd.github+json",
            "-H",
            "X-GitHub-Api-Version: 2022-11-28",
            "-H",
            "User-Agent: repo-util",
        ];
        if let Some(json_data) = json_data {
            args.extend(["-H", "Content-Type: application/json", "-d", json_data]);
        }
        args.push(url);

        let output = Command::new("curl")
            .args(&args)
            .output()
            .await
            .context("Failed to execute curl command")?;

        if !output.status.success() {
            bail!(
                "curl command failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        parse_response(output.stdout)
    }
}

impl Transport for CurlTransport {
    async fn get(&self, url: &str) -> Result<String> {
        self.request("GET", url, None).await
    }

    async fn post(&self, url: &str, json_data: &str) -> Result<String> {
        self.request("POST", url, Some(json_data)).await
    }

    async fn patch(&self, url: &str, json_data: &str) -> Result<String> {
        self.request("PATCH", url, Some(json_data)).await
    }

    async fn put(&self, url: &str, json_data: &str) -> Result<String> {
        self.request("PUT", url, Some(json_data)).await
    }

    async fn delete(&self, url: &str) -> Result<()> {
        self.request("DELETE", url, None).await?;
        Ok(())
    }
}

/// Parse curl output with the status code appended on its own line.
fn parse_response(stdout: Vec<u8>) -> Result<String> {
    let output_str = String::from_utf8(stdout)?;
    let (response, status_code) = match output_str.rsplit_once('\n') {
        Some((response, status)) => (response, status.trim().parse::<u16>().unwrap_or(0)),
        None => ("", output_str.trim().parse::<u16>().unwrap_or(0)),
    };

    if status_code >= 400 {
        // Try to parse error message from response
        if let Ok(error) = serde_json::from_str::<GitHubError>(response) {
            bail!("GitHub API error ({}): {}", status_code, error.message);
        }
        bail!(
            "GitHub API request failed with status {}: {}",
            status_code,
            response
        );
    }

    Ok(response.to_string())
}
