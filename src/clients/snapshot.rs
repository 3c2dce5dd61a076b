use std::cell::RefCell;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use anyhow::ensure;
use futures_util::StreamExt as _;
use futures_util::stream;
use futures_util::stream::LocalBoxStream;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::instrument;

use crate::entity::AttributeValue;
use crate::entity::Entity;
use crate::entity::EntityKind;
use crate::entity::Properties;
use crate::pattern;
use crate::pattern::Pattern;
use crate::provider::Provider;

/// Provider serving entities from a JSON document keyed by collection name:
///
/// ```json
/// { "repositories": [{ "fullName": "a/r", "description": "..." }],
///   "branches": [{ "fullName": "a/r#main" }] }
/// ```
///
/// Mutations apply to the in-memory state and are written back to the file
/// the snapshot was opened from.
pub struct SnapshotProvider {
    path: Option<PathBuf>,
    entities: RefCell<Vec<Entity>>,
}

impl SnapshotProvider {
    pub fn from_json(document: Value) -> Result<Self> {
        let Value::Object(collections) = document else {
            bail!("Snapshot must be an object keyed by collection name");
        };
        let mut entities = Vec::new();
        for (collection, items) in collections {
            let kind = EntityKind::from_collection_name(&collection)
                .with_context(|| format!("Unknown collection in snapshot: {}", collection))?;
            let Value::Array(items) = items else {
                bail!("Snapshot collection {} is not an array", collection);
            };
            for item in items {
                entities.push(Entity::from_json(kind, item)?);
            }
        }
        Ok(Self {
            path: None,
            entities: RefCell::new(entities),
        })
    }

    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let document = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;
        let mut provider = Self::from_json(document)?;
        provider.path = Some(path);
        Ok(provider)
    }

    /// Current state in the document layout read by [`SnapshotProvider::from_json`].
    pub fn to_json(&self) -> Value {
        let mut collections = Map::new();
        for entity in self.entities.borrow().iter() {
            let items = collections
                .entry(entity.kind().collection_name().to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = items {
                items.push(entity.to_json());
            }
        }
        Value::Object(collections)
    }

    async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let text = serde_json::to_string_pretty(&self.to_json())?;
        tokio::fs::write(path, text + "\n")
            .await
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        debug!("Saved snapshot {}", path.display());
        Ok(())
    }

    fn find(&self, kind: EntityKind, full_name: &str) -> Option<Entity> {
        self.entities
            .borrow()
            .iter()
            .find(|e| e.kind() == kind && e.full_name() == full_name)
            .cloned()
    }

    fn replace(&self, entity: Entity) -> Result<()> {
        let mut entities = self.entities.borrow_mut();
        let Some(slot) = entities
            .iter_mut()
            .find(|e| e.kind() == entity.kind() && e.full_name() == entity.full_name())
        else {
            bail!("No such {}: {}", entity.kind(), entity.full_name());
        };
        *slot = entity;
        Ok(())
    }

    fn insert(&self, entity: Entity) -> Result<()> {
        ensure!(
            self.find(entity.kind(), entity.full_name()).is_none(),
            "{} {} already exists",
            entity.kind(),
            entity.full_name()
        );
        self.entities.borrow_mut().push(entity);
        Ok(())
    }

    /// Next free numeric child name below `repository`.
    fn next_number(&self, kind: EntityKind, repository: &str) -> u64 {
        self.entities
            .borrow()
            .iter()
            .filter(|e| e.kind() == kind && e.parent() == Some(repository))
            .filter_map(|e| e.name().parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1
    }

    fn matching(&self, kind: EntityKind, patterns: &[String]) -> Result<Vec<Entity>> {
        let entities = self.entities.borrow();
        let candidates = entities.iter().filter(|e| e.kind() == kind);

        if !kind.is_repository_child() {
            let patterns = pattern::compile(patterns)?;
            return Ok(candidates
                .filter(|e| pattern::matches_any(&patterns, e.full_name()))
                .cloned()
                .collect());
        }

        let patterns = patterns
            .iter()
            .map(|p| {
                let (repository, child) = pattern::split_child(p);
                Ok((Pattern::new(repository)?, Pattern::new(child)?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(candidates
            .filter(|e| {
                let repository = e.parent().unwrap_or_default();
                patterns
                    .iter()
                    .any(|(r, c)| r.is_match(repository) && c.is_match(e.name()))
            })
            .cloned()
            .collect())
    }
}

fn ensure_open(pull_request: &Entity) -> Result<()> {
    ensure!(
        pull_request.kind() == EntityKind::PullRequest,
        "{} is not a pull request",
        pull_request.full_name()
    );
    ensure!(
        pull_request.attribute("state") != Some(AttributeValue::from("closed")),
        "Pull request {} is already closed",
        pull_request.full_name()
    );
    Ok(())
}

impl Provider for SnapshotProvider {
    fn collection(
        &self,
        kind: EntityKind,
        patterns: Vec<String>,
    ) -> LocalBoxStream<'_, Result<Entity>> {
        match self.matching(kind, &patterns) {
            Ok(entities) => stream::iter(entities).map(Ok).boxed_local(),
            Err(e) => stream::once(async move { Err(e) }).boxed_local(),
        }
    }

    #[instrument(skip_all)]
    async fn create_repository(&self, name: &str, properties: &Properties) -> Result<()> {
        ensure!(
            name.contains('/'),
            "Repository name must be owner/name: {}",
            name
        );
        let mut repository = Entity::new(EntityKind::Repository, name)
            .with("defaultBranchName", "main")
            .with("isArchived", false)
            .with("isPrivate", false);
        repository.assign(properties)?;
        self.insert(repository)?;
        self.save().await
    }

    #[instrument(skip_all)]
    async fn create_pull_request(&self, branch: &str, properties: &Properties) -> Result<()> {
        let source = self
            .find(EntityKind::Branch, branch)
            .with_context(|| format!("No such branch: {}", branch))?;
        let repository = source.parent().unwrap_or_default().to_string();
        let destination = self
            .find(EntityKind::Repository, &repository)
            .and_then(|r| r.attribute("defaultBranchName"))
            .map_or_else(|| "main".to_string(), |d| d.to_string());

        let number = self.next_number(EntityKind::PullRequest, &repository);
        let mut pull_request =
            Entity::new(EntityKind::PullRequest, format!("{}#{}", repository, number))
                .with("title", source.name())
                .with("state", "open")
                .with("source", source.name())
                .with("destination", destination)
                .with("draft", false)
                .with("locked", false)
                .with("merged", false);
        pull_request.assign(properties)?;
        self.insert(pull_request)?;
        self.save().await
    }

    #[instrument(skip_all)]
    async fn update(&self, entity: &Entity) -> Result<()> {
        self.replace(entity.clone())?;
        self.save().await
    }

    #[instrument(skip_all)]
    async fn delete(&self, entity: &Entity) -> Result<()> {
        let before = self.entities.borrow().len();
        self.entities
            .borrow_mut()
            .retain(|e| !(e.kind() == entity.kind() && e.full_name() == entity.full_name()));
        ensure!(
            self.entities.borrow().len() < before,
            "No such {}: {}",
            entity.kind(),
            entity.full_name()
        );
        self.save().await
    }

    #[instrument(skip_all)]
    async fn merge(&self, pull_request: &Entity) -> Result<()> {
        ensure_open(pull_request)?;
        let merged = pull_request
            .clone()
            .with("state", "closed")
            .with("merged", true);
        self.replace(merged)?;
        self.save().await
    }

    #[instrument(skip_all)]
    async fn decline(&self, pull_request: &Entity) -> Result<()> {
        ensure_open(pull_request)?;
        self.replace(pull_request.clone().with("state", "closed"))?;
        self.save().await
    }

    #[instrument(skip_all)]
    async fn add_hook(&self, repository: &Entity, url: &str, properties: &Properties) -> Result<()> {
        let id = self.next_number(EntityKind::Hook, repository.full_name());
        let mut hook = Entity::new(
            EntityKind::Hook,
            format!("{}#{}", repository.full_name(), id),
        )
        .with("id", id)
        .with("url", url)
        .with("active", true)
        .with("events", AttributeValue::set(["push"]))
        .with("contentType", "json");
        hook.assign(properties)?;
        self.insert(hook)?;
        self.save().await
    }
}
