use std::collections::HashSet;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use futures_util::StreamExt as _;
use futures_util::TryStreamExt as _;
use futures_util::future;
use futures_util::stream;
use futures_util::stream::LocalBoxStream;
use futures_util::stream::Stream;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::instrument;
use tracing::warn;

use super::github_curl::Transport;
use crate::entity::AttributeType;
use crate::entity::AttributeValue;
use crate::entity::Entity;
use crate::entity::EntityKind;
use crate::entity::Properties;
use crate::pattern;
use crate::pattern::Pattern;
use crate::provider::Provider;

pub const DEFAULT_API: &str = "https://api.github.com";

/// Number of items requested per page.
const PAGE_SIZE: usize = 100;

/// Entity attribute to GitHub request field. `a.b` nests `b` inside object `a`.
const REPOSITORY_FIELDS: &[(&str, &str)] = &[
    ("description", "description"),
    ("homePageURL", "homepage"),
    ("defaultBranchName", "default_branch"),
    ("isArchived", "archived"),
    ("isPrivate", "private"),
    ("isTemplate", "is_template"),
];

const PULL_REQUEST_FIELDS: &[(&str, &str)] = &[
    ("title", "title"),
    ("body", "body"),
    ("state", "state"),
    ("destination", "base"),
];

const HOOK_FIELDS: &[(&str, &str)] = &[
    ("url", "config.url"),
    ("contentType", "config.content_type"),
    ("secret", "config.secret"),
    ("events", "events"),
    ("active", "active"),
];

const MILESTONE_FIELDS: &[(&str, &str)] = &[
    ("title", "title"),
    ("description", "description"),
    ("state", "state"),
    ("dueOn", "due_on"),
];

// -----------------------------------------------------------------------------
// Types

/// Provider backed by the GitHub REST API.
pub struct GithubProvider<T> {
    api: String,
    transport: T,
    page_size: usize,
}

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
    id: u64,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(rename = "type", default)]
    account_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhOrganization {
    login: String,
    id: u64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhRepository {
    full_name: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    clone_url: Option<String>,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    fork: bool,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    is_template: Option<bool>,
    #[serde(default)]
    topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GhCommit {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GhBranch {
    name: String,
    #[serde(default)]
    protected: bool,
    commit: GhCommit,
}

#[derive(Debug, Deserialize)]
struct GhTag {
    name: String,
    commit: GhCommit,
}

#[derive(Debug, Deserialize)]
struct GhRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Debug, Deserialize)]
struct GhPullRequest {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: String,
    #[serde(default)]
    draft: Option<bool>,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    merged_at: Option<String>,
    html_url: String,
    head: GhRef,
    base: GhRef,
}

#[derive(Debug, Deserialize)]
struct GhHookConfig {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    insecure_ssl: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhHook {
    id: u64,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    events: Vec<String>,
    config: GhHookConfig,
}

#[derive(Debug, Deserialize)]
struct GhMilestone {
    number: u64,
    id: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    state: String,
    #[serde(default)]
    due_on: Option<String>,
}

// -----------------------------------------------------------------------------
// Conversions

impl GhUser {
    fn into_entity(self) -> Entity {
        Entity::new(EntityKind::RepositoryGroup, self.login)
            .with("id", self.id)
            .with_some("description", self.bio)
            .with_some("type", self.account_type)
            .with_some("url", self.html_url)
    }
}

impl GhOrganization {
    fn into_entity(self) -> Entity {
        Entity::new(EntityKind::RepositoryGroup, self.login)
            .with("id", self.id)
            .with("type", "Organization")
            .with_some("description", self.description)
            .with_some("url", self.url)
    }
}

impl GhRepository {
    fn into_entity(self) -> Entity {
        Entity::new(EntityKind::Repository, self.full_name)
            .with_some("id", self.id)
            .with_some("description", self.description)
            .with_some("homePageURL", self.homepage.filter(|h| !h.is_empty()))
            .with_some("defaultBranchName", self.default_branch)
            .with_some("cloneURL", self.clone_url)
            .with("isArchived", self.archived)
            .with("isFork", self.fork)
            .with("isPrivate", self.private)
            .with_some("isTemplate", self.is_template)
            .with("topics", self.topics)
    }
}

impl GhBranch {
    fn into_entity(self, repository: &str) -> Entity {
        Entity::new(EntityKind::Branch, format!("{}#{}", repository, self.name))
            .with("isProtected", self.protected)
            .with("sha", self.commit.sha)
    }
}

impl GhTag {
    fn into_entity(self, repository: &str) -> Entity {
        Entity::new(EntityKind::Tag, format!("{}#{}", repository, self.name))
            .with("sha", self.commit.sha)
    }
}

impl GhPullRequest {
    fn into_entity(self, repository: &str) -> Entity {
        Entity::new(
            EntityKind::PullRequest,
            format!("{}#{}", repository, self.number),
        )
        .with("title", self.title)
        .with_some("body", self.body)
        .with("state", self.state)
        .with("source", self.head.ref_name)
        .with("destination", self.base.ref_name)
        .with_some("draft", self.draft)
        .with("locked", self.locked)
        .with("merged", self.merged_at.is_some())
        .with("url", self.html_url)
    }
}

impl GhHook {
    fn into_entity(self, repository: &str) -> Entity {
        Entity::new(EntityKind::Hook, format!("{}#{}", repository, self.id))
            .with("id", self.id)
            .with("active", self.active)
            .with("events", AttributeValue::set(self.events))
            .with_some("url", self.config.url)
            .with_some("contentType", self.config.content_type)
            .with_some("insecureSsl", self.config.insecure_ssl.map(|s| s == "1"))
    }
}

impl GhMilestone {
    fn into_entity(self, repository: &str) -> Entity {
        Entity::new(
            EntityKind::Milestone,
            format!("{}#{}", repository, self.number),
        )
        .with("id", self.id)
        .with("title", self.title)
        .with_some("description", self.description)
        .with("state", self.state)
        .with_some("dueOn", self.due_on)
    }
}

// -----------------------------------------------------------------------------
// GithubProvider impl

impl<T: Transport> GithubProvider<T> {
    pub fn new(api: impl Into<String>, transport: T) -> Self {
        Self {
            api: api.into().trim_end_matches('/').to_string(),
            transport,
            page_size: PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api, path)
    }

    async fn get_json<D: DeserializeOwned>(&self, path: &str) -> Result<D> {
        let url = self.url(path);
        let response = self.transport.get(&url).await?;
        serde_json::from_str(&response).with_context(|| format!("Unexpected response from {}", url))
    }

    /// Lazily fetch every page of a list endpoint.
    fn paginate<D: DeserializeOwned + 'static>(&self, path: String) -> LocalBoxStream<'_, Result<D>> {
        let page_size = self.page_size;
        stream::try_unfold(Some(1usize), move |page| {
            let path = path.clone();
            async move {
                let Some(page) = page else {
                    return Ok(None);
                };
                let separator = if path.contains('?') { '&' } else { '?' };
                let items: Vec<D> = self
                    .get_json(&format!(
                        "{}{}per_page={}&page={}",
                        path, separator, page_size, page
                    ))
                    .await?;
                let next = (items.len() >= page_size).then_some(page + 1);
                let items = stream::iter(items.into_iter().map(Ok::<D, anyhow::Error>));
                Ok::<_, anyhow::Error>(Some((items, next)))
            }
        })
        .try_flatten()
        .boxed_local()
    }

    async fn login(&self) -> Result<String> {
        let user: GhUser = self.get_json("/user").await?;
        Ok(user.login)
    }

    fn providers(&self, patterns: Vec<String>) -> LocalBoxStream<'_, Result<Entity>> {
        let patterns = match pattern::compile(&patterns) {
            Ok(patterns) => patterns,
            Err(e) => return failed(e),
        };
        let provider = Entity::new(EntityKind::Provider, "github")
            .with("description", "GitHub")
            .with("api", self.api.clone())
            .with("priority", 1u64);
        let entities = pattern::matches_any(&patterns, provider.full_name())
            .then_some(Ok(provider));
        stream::iter(entities).boxed_local()
    }

    fn groups(&self, patterns: Vec<String>) -> LocalBoxStream<'_, Result<Entity>> {
        let patterns = match pattern::compile(&patterns) {
            Ok(patterns) => patterns,
            Err(e) => return failed(e),
        };
        let user = stream::once(async move {
            let user: GhUser = self.get_json("/user").await?;
            Ok::<_, anyhow::Error>(user.into_entity())
        });
        let organizations = self
            .paginate::<GhOrganization>("/user/orgs".to_string())
            .map_ok(GhOrganization::into_entity);
        user.chain(organizations)
            .try_filter(move |e| future::ready(pattern::matches_any(&patterns, e.full_name())))
            .boxed_local()
    }

    /// Repositories matching any pattern. A literal owner part selects that
    /// owner's listing; otherwise every repository visible to the user is scanned.
    fn repositories(&self, patterns: Vec<String>) -> LocalBoxStream<'_, Result<Entity>> {
        let parsed = match patterns
            .iter()
            .map(|p| Ok((p.clone(), Pattern::new(p)?)))
            .collect::<Result<Vec<_>>>()
        {
            Ok(parsed) => parsed,
            Err(e) => return failed(e),
        };

        let streams = parsed.into_iter().map(move |(raw, pattern)| {
            stream::once(async move { self.repository_listing(&raw).await })
                .map_ok(move |path| self.paginate::<GhRepository>(path))
                .try_flatten()
                .map_ok(GhRepository::into_entity)
                .try_filter(move |e| future::ready(pattern.is_match(e.full_name())))
        });
        unique(stream::iter(streams).flatten())
    }

    /// Listing endpoint for a repository pattern. `/users/{owner}/repos` only
    /// holds public repositories, so the user's own and organisation
    /// repositories are listed through endpoints that include private ones.
    async fn repository_listing(&self, pattern: &str) -> Result<String> {
        let owner = match pattern.split_once('/') {
            Some((owner, _)) if pattern::is_literal(owner) => owner,
            _ => return Ok("/user/repos".to_string()),
        };
        let account: GhUser = self.get_json(&format!("/users/{}", owner)).await?;
        if account.account_type.as_deref() == Some("Organization") {
            return Ok(format!("/orgs/{}/repos?type=all", account.login));
        }
        if account.login.eq_ignore_ascii_case(&self.login().await?) {
            return Ok("/user/repos?affiliation=owner".to_string());
        }
        Ok(format!("/users/{}/repos", account.login))
    }

    /// Children of the repositories matching `owner/repo#child` patterns.
    fn children(&self, kind: EntityKind, patterns: Vec<String>) -> LocalBoxStream<'_, Result<Entity>> {
        let parsed = match patterns
            .iter()
            .map(|p| {
                let (repository, child) = pattern::split_child(p);
                Ok((repository.to_string(), Pattern::new(child)?))
            })
            .collect::<Result<Vec<_>>>()
        {
            Ok(parsed) => parsed,
            Err(e) => return failed(e),
        };

        let streams = parsed.into_iter().map(move |(repository, child)| {
            self.repositories(vec![repository])
                .map_ok(move |repository| self.children_of(kind, repository.full_name().to_string()))
                .try_flatten()
                .try_filter(move |e| future::ready(child.is_match(e.name())))
        });
        unique(stream::iter(streams).flatten())
    }

    fn children_of(&self, kind: EntityKind, repository: String) -> LocalBoxStream<'_, Result<Entity>> {
        match kind {
            EntityKind::Branch => self
                .paginate::<GhBranch>(format!("/repos/{}/branches", repository))
                .map_ok(move |branch| branch.into_entity(&repository))
                .boxed_local(),
            EntityKind::Tag => self
                .paginate::<GhTag>(format!("/repos/{}/tags", repository))
                .map_ok(move |tag| tag.into_entity(&repository))
                .boxed_local(),
            EntityKind::PullRequest => self
                .paginate::<GhPullRequest>(format!("/repos/{}/pulls?state=all", repository))
                .map_ok(move |pr| pr.into_entity(&repository))
                .boxed_local(),
            EntityKind::Hook => self
                .paginate::<GhHook>(format!("/repos/{}/hooks", repository))
                .map_ok(move |hook| hook.into_entity(&repository))
                .boxed_local(),
            EntityKind::Milestone => self
                .paginate::<GhMilestone>(format!("/repos/{}/milestones?state=all", repository))
                .map_ok(move |milestone| milestone.into_entity(&repository))
                .boxed_local(),
            _ => stream::empty().boxed_local(),
        }
    }

    async fn patch_fields(&self, path: &str, body: Map<String, Value>) -> Result<()> {
        if body.is_empty() {
            debug!("Nothing to update for {}", path);
            return Ok(());
        }
        self.transport
            .patch(&self.url(path), &Value::Object(body).to_string())
            .await?;
        Ok(())
    }
}

impl<T: Transport> Provider for GithubProvider<T> {
    fn collection(
        &self,
        kind: EntityKind,
        patterns: Vec<String>,
    ) -> LocalBoxStream<'_, Result<Entity>> {
        match kind {
            EntityKind::Provider => self.providers(patterns),
            EntityKind::RepositoryGroup => self.groups(patterns),
            EntityKind::Repository => self.repositories(patterns),
            EntityKind::Project | EntityKind::Application => {
                debug!("GitHub provides no {}", kind.collection_name());
                stream::empty().boxed_local()
            }
            _ => self.children(kind, patterns),
        }
    }

    #[instrument(skip_all)]
    async fn create_repository(&self, name: &str, properties: &Properties) -> Result<()> {
        let (owner, repository) = match name.split_once('/') {
            Some((owner, repository)) => (Some(owner), repository),
            None => (None, name),
        };
        let path = match owner {
            Some(owner) if owner != self.login().await? => format!("/orgs/{}/repos", owner),
            _ => "/user/repos".to_string(),
        };

        let mut template = Entity::new(EntityKind::Repository, name);
        template.assign(properties)?;
        let mut body = request_body(&template, REPOSITORY_FIELDS, &["topics"])?;
        body.insert("name".to_string(), Value::String(repository.to_string()));

        self.transport
            .post(&self.url(&path), &Value::Object(body).to_string())
            .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn create_pull_request(&self, branch: &str, properties: &Properties) -> Result<()> {
        let (repository, head) = branch
            .split_once('#')
            .with_context(|| format!("{} is not a branch name (owner/repo#branch)", branch))?;
        let base = match properties.get("destination") {
            Some(destination) => destination.clone(),
            None => {
                let repo: GhRepository = self.get_json(&format!("/repos/{}", repository)).await?;
                repo.default_branch
                    .with_context(|| format!("{} has no default branch", repository))?
            }
        };

        let body = json!({
            "head": head,
            "base": base,
            "title": properties.get("title").map_or(head, String::as_str),
            "body": properties.get("body").map_or("", String::as_str),
            "draft": properties.get("draft").is_some_and(|d| d == "true"),
        });
        self.transport
            .post(
                &self.url(&format!("/repos/{}/pulls", repository)),
                &body.to_string(),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn update(&self, entity: &Entity) -> Result<()> {
        match entity.kind() {
            EntityKind::Repository => {
                let path = format!("/repos/{}", entity.full_name());
                let body = request_body(entity, REPOSITORY_FIELDS, &["topics"])?;
                self.patch_fields(&path, body).await?;

                if let Some((_, topics)) = entity.assigned().find(|(name, _)| *name == "topics") {
                    let names = match topics {
                        AttributeValue::List(values) | AttributeValue::Set(values) => {
                            values.clone()
                        }
                        other => vec![other.to_string()],
                    };
                    self.transport
                        .put(
                            &self.url(&format!("{}/topics", path)),
                            &json!({ "names": names }).to_string(),
                        )
                        .await?;
                }
                Ok(())
            }
            EntityKind::PullRequest => {
                let body = request_body(entity, PULL_REQUEST_FIELDS, &[])?;
                self.patch_fields(&child_path(entity, "pulls")?, body).await
            }
            EntityKind::Hook => {
                let body = request_body(entity, HOOK_FIELDS, &[])?;
                self.patch_fields(&child_path(entity, "hooks")?, body).await
            }
            EntityKind::Milestone => {
                let body = request_body(entity, MILESTONE_FIELDS, &[])?;
                self.patch_fields(&child_path(entity, "milestones")?, body)
                    .await
            }
            kind => bail!("GitHub does not support updating {} entities", kind),
        }
    }

    #[instrument(skip_all)]
    async fn delete(&self, entity: &Entity) -> Result<()> {
        match entity.kind() {
            EntityKind::Hook => {
                self.transport
                    .delete(&self.url(&child_path(entity, "hooks")?))
                    .await
            }
            kind => bail!("GitHub does not support deleting {} entities", kind),
        }
    }

    #[instrument(skip_all)]
    async fn merge(&self, pull_request: &Entity) -> Result<()> {
        ensure_pull_request(pull_request)?;
        let path = format!("{}/merge", child_path(pull_request, "pulls")?);
        self.transport.put(&self.url(&path), "{}").await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn decline(&self, pull_request: &Entity) -> Result<()> {
        ensure_pull_request(pull_request)?;
        let mut body = Map::new();
        body.insert("state".to_string(), Value::String("closed".to_string()));
        self.patch_fields(&child_path(pull_request, "pulls")?, body)
            .await
    }

    #[instrument(skip_all)]
    async fn add_hook(&self, repository: &Entity, url: &str, properties: &Properties) -> Result<()> {
        let events = match properties.get("events") {
            Some(raw) => match AttributeValue::parse(AttributeType::Set, raw)? {
                AttributeValue::Set(events) => events,
                other => vec![other.to_string()],
            },
            None => vec!["push".to_string()],
        };
        let content_type = properties
            .get("contentType")
            .map_or("json", String::as_str);

        let body = json!({
            "name": "web",
            "active": true,
            "events": events,
            "config": { "url": url, "content_type": content_type },
        });
        self.transport
            .post(
                &self.url(&format!("/repos/{}/hooks", repository.full_name())),
                &body.to_string(),
            )
            .await?;
        Ok(())
    }

    fn statistics(&self) -> Option<String> {
        self.transport.statistics()
    }
}

// -----------------------------------------------------------------------------
// Helpers

fn failed<'a>(error: anyhow::Error) -> LocalBoxStream<'a, Result<Entity>> {
    stream::once(future::ready(Err(error))).boxed_local()
}

/// Drop entities already yielded under the same full name.
fn unique<'a>(entities: impl Stream<Item = Result<Entity>> + 'a) -> LocalBoxStream<'a, Result<Entity>> {
    let mut seen = HashSet::new();
    entities
        .try_filter(move |e| future::ready(seen.insert(e.full_name().to_string())))
        .boxed_local()
}

fn child_path(entity: &Entity, segment: &str) -> Result<String> {
    let repository = entity
        .parent()
        .with_context(|| format!("{} has no repository", entity.full_name()))?;
    Ok(format!("/repos/{}/{}/{}", repository, segment, entity.name()))
}

fn ensure_pull_request(entity: &Entity) -> Result<()> {
    if entity.kind() != EntityKind::PullRequest {
        bail!("{} is not a pull request", entity.full_name());
    }
    Ok(())
}

/// Request body holding the assigned attributes that map to GitHub fields.
fn request_body(entity: &Entity, fields: &[(&str, &str)], skip: &[&str]) -> Result<Map<String, Value>> {
    let mut body = Map::new();
    for (name, value) in entity.assigned() {
        if skip.contains(&name) {
            continue;
        }
        let Some((_, field)) = fields.iter().find(|(attribute, _)| *attribute == name) else {
            warn!("{} of {} cannot be changed on GitHub", name, entity.kind());
            continue;
        };
        let value = serde_json::to_value(value)?;
        match field.split_once('.') {
            Some((outer, inner)) => {
                let nested = body
                    .entry(outer.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(nested) = nested {
                    nested.insert(inner.to_string(), value);
                }
            }
            None => {
                body.insert(field.to_string(), value);
            }
        }
    }
    Ok(body)
}
