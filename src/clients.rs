//! Backends serving hosting entities.
//!
//! - [`github`]: GitHub REST provider
//! - [`github_curl`]: Curl-based HTTP transport for the GitHub API
//! - [`cache`]: In-process cache of GET responses in front of a transport
//! - [`snapshot`]: Offline provider backed by a JSON file
//!
//! [`AnyProvider`] selects one of them from the [`Config`].

use anyhow::Context;
use anyhow::Result;
use futures_util::stream::LocalBoxStream;
use tracing::debug;

use crate::Config;
use crate::entity::Entity;
use crate::entity::EntityKind;
use crate::entity::Properties;
use crate::provider::Provider;

pub mod cache;
pub mod github;
pub mod github_curl;
pub mod snapshot;

use cache::CachedTransport;
use github::GithubProvider;
use github_curl::CurlTransport;
use snapshot::SnapshotProvider;

pub enum AnyProvider {
    Github(GithubProvider<CachedTransport<CurlTransport>>),
    Snapshot(SnapshotProvider),
}

impl AnyProvider {
    /// A snapshot file takes precedence over GitHub.
    pub async fn from_config(config: &Config, cache: bool) -> Result<Self> {
        if let Some(path) = &config.snapshot {
            debug!("Using snapshot {}", path.display());
            return Ok(Self::Snapshot(SnapshotProvider::open(path).await?));
        }
        let token = config.github_token.as_ref().context(
            "No GitHub token found. Set GITHUB_TOKEN or run \
             'git config --global repo-util.githubToken <token>'",
        )?;
        debug!("Using GitHub at {}", config.github_api);
        let transport = CachedTransport::new(CurlTransport::new(token.clone()), cache);
        Ok(Self::Github(GithubProvider::new(
            config.github_api.as_str(),
            transport,
        )))
    }
}

impl Provider for AnyProvider {
    fn collection(
        &self,
        kind: EntityKind,
        patterns: Vec<String>,
    ) -> LocalBoxStream<'_, Result<Entity>> {
        match self {
            Self::Github(p) => p.collection(kind, patterns),
            Self::Snapshot(p) => p.collection(kind, patterns),
        }
    }

    async fn create_repository(&self, name: &str, properties: &Properties) -> Result<()> {
        match self {
            Self::Github(p) => p.create_repository(name, properties).await,
            Self::Snapshot(p) => p.create_repository(name, properties).await,
        }
    }

    async fn create_pull_request(&self, branch: &str, properties: &Properties) -> Result<()> {
        match self {
            Self::Github(p) => p.create_pull_request(branch, properties).await,
            Self::Snapshot(p) => p.create_pull_request(branch, properties).await,
        }
    }

    async fn update(&self, entity: &Entity) -> Result<()> {
        match self {
            Self::Github(p) => p.update(entity).await,
            Self::Snapshot(p) => p.update(entity).await,
        }
    }

    async fn delete(&self, entity: &Entity) -> Result<()> {
        match self {
            Self::Github(p) => p.delete(entity).await,
            Self::Snapshot(p) => p.delete(entity).await,
        }
    }

    async fn merge(&self, pull_request: &Entity) -> Result<()> {
        match self {
            Self::Github(p) => p.merge(pull_request).await,
            Self::Snapshot(p) => p.merge(pull_request).await,
        }
    }

    async fn decline(&self, pull_request: &Entity) -> Result<()> {
        match self {
            Self::Github(p) => p.decline(pull_request).await,
            Self::Snapshot(p) => p.decline(pull_request).await,
        }
    }

    async fn add_hook(&self, repository: &Entity, url: &str, properties: &Properties) -> Result<()> {
        match self {
            Self::Github(p) => p.add_hook(repository, url, properties).await,
            Self::Snapshot(p) => p.add_hook(repository, url, properties).await,
        }
    }

    fn statistics(&self) -> Option<String> {
        match self {
            Self::Github(p) => p.statistics(),
            Self::Snapshot(p) => p.statistics(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_token_is_an_error() {
        let config = Config::from_lookup(|_| None);
        let error = AnyProvider::from_config(&config, true)
            .await
            .err()
            .unwrap();
        assert!(error.to_string().contains("GITHUB_TOKEN"));
    }

    #[tokio::test]
    async fn test_snapshot_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "{}").unwrap();
        let path_value = path.display().to_string();

        let config = Config::from_lookup(|key| match key {
            "REPO_UTIL_SNAPSHOT" => Some(path_value.clone()),
            "GITHUB_TOKEN" => Some("token".to_string()),
            _ => None,
        });
        let provider = AnyProvider::from_config(&config, true).await.unwrap();
        assert!(matches!(provider, AnyProvider::Snapshot(_)));
    }

    #[tokio::test]
    async fn test_github_with_token() {
        let config = Config::from_lookup(|key| (key == "GH_TOKEN").then(|| "token".to_string()));
        let provider = AnyProvider::from_config(&config, false).await.unwrap();
        assert!(matches!(provider, AnyProvider::Github(_)));
        assert_eq!(provider.statistics(), None);
    }
}
