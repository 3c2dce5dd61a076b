#![allow(async_fn_in_trait)]

use anyhow::Result;
use futures_util::stream::LocalBoxStream;

use crate::entity::Entity;
use crate::entity::EntityKind;
use crate::entity::Properties;

// -----------------------------------------------------------------------------
// Provider trait

/// A source of hosting entities and the operations that mutate them.
pub trait Provider {
    /// Lazily list the entities of `kind` whose full name matches any of `patterns`.
    fn collection(&self, kind: EntityKind, patterns: Vec<String>)
    -> LocalBoxStream<'_, Result<Entity>>;

    async fn create_repository(&self, name: &str, properties: &Properties) -> Result<()>;

    /// Open a pull request from `branch` (`owner/repo#branch`).
    async fn create_pull_request(&self, branch: &str, properties: &Properties) -> Result<()>;

    /// Push the attributes assigned on `entity` back to the provider.
    async fn update(&self, entity: &Entity) -> Result<()>;

    async fn delete(&self, entity: &Entity) -> Result<()>;

    async fn merge(&self, pull_request: &Entity) -> Result<()>;

    async fn decline(&self, pull_request: &Entity) -> Result<()>;

    async fn add_hook(&self, repository: &Entity, url: &str, properties: &Properties)
    -> Result<()>;

    /// Summary of cache usage, if the provider caches responses.
    fn statistics(&self) -> Option<String> {
        None
    }
}

// -----------------------------------------------------------------------------
// RecordingProvider
