use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt::Display;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use anyhow::ensure;
use serde::Serialize;
use serde_json::Value;

/// Key/value pairs collected from `-D key=value` definitions.
pub type Properties = BTreeMap<String, String>;

/// Name of the identifier attribute every entity exposes.
pub const FULL_NAME: &str = "fullName";

// -----------------------------------------------------------------------------
// EntityKind

/// The kinds of hosting entities the tool knows how to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Provider,
    RepositoryGroup,
    Repository,
    Branch,
    Tag,
    Project,
    Milestone,
    Application,
    Hook,
    PullRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Number,
    Boolean,
    List,
    Set,
}

/// Declaration of a single entity attribute.
#[derive(Debug, Clone, Copy)]
pub struct AttributeSpec {
    pub name: &'static str,
    pub kind: AttributeType,
    /// Private attributes are never listed.
    pub private: bool,
}

const fn attr(name: &'static str, kind: AttributeType) -> AttributeSpec {
    AttributeSpec {
        name,
        kind,
        private: false,
    }
}

const fn private(name: &'static str, kind: AttributeType) -> AttributeSpec {
    AttributeSpec {
        name,
        kind,
        private: true,
    }
}

use AttributeType as T;

const PROVIDER_ATTRIBUTES: &[AttributeSpec] = &[
    attr("name", T::String),
    attr("description", T::String),
    attr("api", T::String),
    attr("priority", T::Number),
    private("token", T::String),
];

const GROUP_ATTRIBUTES: &[AttributeSpec] = &[
    attr("name", T::String),
    attr("description", T::String),
    attr("id", T::Number),
    attr("type", T::String),
    attr("url", T::String),
];

const REPOSITORY_ATTRIBUTES: &[AttributeSpec] = &[
    attr("name", T::String),
    attr("description", T::String),
    attr("id", T::Number),
    attr("homePageURL", T::String),
    attr("defaultBranchName", T::String),
    attr("cloneURL", T::String),
    attr("isArchived", T::Boolean),
    attr("isFork", T::Boolean),
    attr("isPrivate", T::Boolean),
    attr("isTemplate", T::Boolean),
    attr("topics", T::List),
];

const BRANCH_ATTRIBUTES: &[AttributeSpec] = &[
    attr("name", T::String),
    attr("isProtected", T::Boolean),
    attr("sha", T::String),
];

const TAG_ATTRIBUTES: &[AttributeSpec] = &[attr("name", T::String), attr("sha", T::String)];

const PROJECT_ATTRIBUTES: &[AttributeSpec] = &[
    attr("name", T::String),
    attr("description", T::String),
    attr("id", T::Number),
    attr("state", T::String),
    attr("url", T::String),
];

const MILESTONE_ATTRIBUTES: &[AttributeSpec] = &[
    attr("name", T::String),
    attr("title", T::String),
    attr("description", T::String),
    attr("id", T::Number),
    attr("state", T::String),
    attr("dueOn", T::String),
];

const APPLICATION_ATTRIBUTES: &[AttributeSpec] = &[
    attr("name", T::String),
    attr("description", T::String),
    attr("id", T::Number),
    attr("url", T::String),
];

const HOOK_ATTRIBUTES: &[AttributeSpec] = &[
    attr("name", T::String),
    attr("id", T::Number),
    attr("url", T::String),
    attr("events", T::Set),
    attr("active", T::Boolean),
    attr("contentType", T::String),
    attr("insecureSsl", T::Boolean),
    private("secret", T::String),
];

const PULL_REQUEST_ATTRIBUTES: &[AttributeSpec] = &[
    attr("name", T::String),
    attr("title", T::String),
    attr("body", T::String),
    attr("state", T::String),
    attr("source", T::String),
    attr("destination", T::String),
    attr("draft", T::Boolean),
    attr("locked", T::Boolean),
    attr("merged", T::Boolean),
    attr("url", T::String),
];

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Provider,
        EntityKind::RepositoryGroup,
        EntityKind::Repository,
        EntityKind::Branch,
        EntityKind::Tag,
        EntityKind::Project,
        EntityKind::Milestone,
        EntityKind::Application,
        EntityKind::Hook,
        EntityKind::PullRequest,
    ];

    /// Name used for the command line subcommand.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::RepositoryGroup => "group",
            Self::Repository => "repository",
            Self::Branch => "branch",
            Self::Tag => "tag",
            Self::Project => "project",
            Self::Milestone => "milestone",
            Self::Application => "application",
            Self::Hook => "hook",
            Self::PullRequest => "pull-request",
        }
    }

    /// Name of the provider collection holding entities of this kind.
    pub fn collection_name(self) -> &'static str {
        match self {
            Self::Provider => "providers",
            Self::RepositoryGroup => "repositoryGroups",
            Self::Repository => "repositories",
            Self::Branch => "branches",
            Self::Tag => "tags",
            Self::Project => "projects",
            Self::Milestone => "milestones",
            Self::Application => "applications",
            Self::Hook => "hooks",
            Self::PullRequest => "pullRequests",
        }
    }

    pub fn from_collection_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.collection_name() == name)
    }

    pub fn attributes(self) -> &'static [AttributeSpec] {
        match self {
            Self::Provider => PROVIDER_ATTRIBUTES,
            Self::RepositoryGroup => GROUP_ATTRIBUTES,
            Self::Repository => REPOSITORY_ATTRIBUTES,
            Self::Branch => BRANCH_ATTRIBUTES,
            Self::Tag => TAG_ATTRIBUTES,
            Self::Project => PROJECT_ATTRIBUTES,
            Self::Milestone => MILESTONE_ATTRIBUTES,
            Self::Application => APPLICATION_ATTRIBUTES,
            Self::Hook => HOOK_ATTRIBUTES,
            Self::PullRequest => PULL_REQUEST_ATTRIBUTES,
        }
    }

    pub fn attribute(self, name: &str) -> Option<&'static AttributeSpec> {
        self.attributes().iter().find(|spec| spec.name == name)
    }

    /// Whether entities of this kind live below a repository (`owner/repo#name`).
    pub fn is_repository_child(self) -> bool {
        matches!(
            self,
            Self::Branch
                | Self::Tag
                | Self::Project
                | Self::Milestone
                | Self::Application
                | Self::Hook
                | Self::PullRequest
        )
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

// -----------------------------------------------------------------------------
// AttributeValue

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Number(serde_json::Number),
    Boolean(bool),
    List(Vec<String>),
    /// Unique values, kept in the order the provider reported them.
    Set(Vec<String>),
}

impl AttributeValue {
    /// Build a set value, dropping repeated elements.
    pub fn set<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = BTreeSet::new();
        let values = values
            .into_iter()
            .map(Into::into)
            .filter(|value: &String| seen.insert(value.clone()))
            .collect();
        Self::Set(values)
    }

    /// Parse a command line definition according to the declared attribute type.
    pub fn parse(kind: AttributeType, raw: &str) -> Result<Self> {
        let value = match kind {
            AttributeType::String => Self::String(raw.to_string()),
            AttributeType::Number => Self::Number(parse_number(raw)?),
            AttributeType::Boolean => Self::Boolean(
                raw.parse()
                    .with_context(|| format!("'{}' is not a boolean", raw))?,
            ),
            AttributeType::List => Self::List(split_elements(raw).collect()),
            AttributeType::Set => Self::set(split_elements(raw)),
        };
        Ok(value)
    }

    /// Convert a JSON value, guided by the declared type when there is one.
    pub fn from_json(kind: Option<AttributeType>, value: Value) -> Result<Option<Self>> {
        let value = match value {
            Value::Null => return Ok(None),
            Value::String(s) => match kind {
                Some(kind @ (AttributeType::Number | AttributeType::Boolean)) => {
                    Self::parse(kind, &s)?
                }
                _ => Self::String(s),
            },
            Value::Number(n) => Self::Number(n),
            Value::Bool(b) => Self::Boolean(b),
            Value::Array(items) => {
                let items = items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s),
                        Value::Number(n) => Ok(n.to_string()),
                        Value::Bool(b) => Ok(b.to_string()),
                        other => bail!("unsupported array element {}", other),
                    })
                    .collect::<Result<Vec<_>>>()?;
                match kind {
                    Some(AttributeType::Set) => Self::set(items),
                    _ => Self::List(items),
                }
            }
            Value::Object(_) => bail!("nested objects are not supported as attribute values"),
        };
        Ok(Some(value))
    }
}

fn parse_number(raw: &str) -> Result<serde_json::Number> {
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(n.into());
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .with_context(|| format!("'{}' is not a number", raw))
}

fn split_elements(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::List(values) | Self::Set(values) => f.write_str(&values.join(" ")),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

// -----------------------------------------------------------------------------
// Entity

/// A hosting entity as yielded by a provider collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    kind: EntityKind,
    full_name: String,
    attributes: BTreeMap<String, AttributeValue>,
    /// Attributes assigned since the entity was fetched.
    assigned: BTreeSet<String>,
}

impl Entity {
    pub fn new(kind: EntityKind, full_name: impl Into<String>) -> Self {
        Self {
            kind,
            full_name: full_name.into(),
            attributes: BTreeMap::new(),
            assigned: BTreeSet::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_some<V: Into<AttributeValue>>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with(name, value),
            None => self,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Full name of the owning repository for repository children.
    pub fn parent(&self) -> Option<&str> {
        self.full_name.split_once('#').map(|(parent, _)| parent)
    }

    /// The last path component of the full name.
    pub fn name(&self) -> &str {
        match self.full_name.rsplit_once('#') {
            Some((_, name)) => name,
            None => self
                .full_name
                .rsplit_once('/')
                .map_or(self.full_name.as_str(), |(_, name)| name),
        }
    }

    /// Resolve an attribute by name. `fullName` is always defined.
    pub fn attribute(&self, name: &str) -> Option<AttributeValue> {
        if name == FULL_NAME {
            return Some(AttributeValue::String(self.full_name.clone()));
        }
        self.attributes.get(name).cloned()
    }

    /// Assign every property onto the entity, converting values to the declared type.
    pub fn assign(&mut self, properties: &Properties) -> Result<()> {
        for (name, raw) in properties {
            ensure!(name != FULL_NAME, "{} cannot be assigned", FULL_NAME);
            let kind = self
                .kind
                .attribute(name)
                .map_or(AttributeType::String, |spec| spec.kind);
            let value = AttributeValue::parse(kind, raw)
                .with_context(|| format!("Invalid value for {}", name))?;
            self.attributes.insert(name.clone(), value);
            self.assigned.insert(name.clone());
        }
        Ok(())
    }

    /// Attributes assigned since the entity was fetched, in name order.
    pub fn assigned(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.assigned
            .iter()
            .filter_map(|name| Some((name.as_str(), self.attributes.get(name)?)))
    }

    /// JSON object holding `fullName` and the defined values of `attributes`.
    pub fn projection(&self, attributes: &[String]) -> Value {
        let mut object = serde_json::Map::new();
        object.insert(FULL_NAME.to_string(), Value::String(self.full_name.clone()));
        for name in attributes.iter().filter(|name| *name != FULL_NAME) {
            if let Some(value) = self.attributes.get(name) {
                object.insert(name.clone(), attribute_json(value));
            }
        }
        Value::Object(object)
    }

    /// JSON object holding `fullName` and every attribute.
    pub fn to_json(&self) -> Value {
        let names: Vec<String> = self.attributes.keys().cloned().collect();
        self.projection(&names)
    }

    pub fn from_json(kind: EntityKind, value: Value) -> Result<Self> {
        let Value::Object(mut object) = value else {
            bail!("{} entry is not an object", kind);
        };
        let full_name = match object.remove(FULL_NAME) {
            Some(Value::String(full_name)) => full_name,
            _ => bail!("{} entry has no {}", kind, FULL_NAME),
        };
        let mut entity = Self::new(kind, full_name);
        for (name, value) in object {
            let declared = kind.attribute(&name).map(|spec| spec.kind);
            let value = AttributeValue::from_json(declared, value)
                .with_context(|| format!("Invalid attribute {} of {}", name, entity.full_name))?;
            if let Some(value) = value {
                entity.attributes.insert(name, value);
            }
        }
        Ok(entity)
    }
}

fn attribute_json(value: &AttributeValue) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
