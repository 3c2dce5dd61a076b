//! Declarations of the entity kinds exposed on the command line.
//!
//! Each [`TypeDescriptor`] names the provider collection for one entity kind,
//! the attributes shown when listing it, and the actions that can be run
//! against it. Every descriptor carries an `update` instance action; the
//! kind-specific actions are merged on top and may replace it.

use std::collections::BTreeMap;

use crate::entity::EntityKind;
use crate::entity::FULL_NAME;

/// Operations run once per listed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceOp {
    /// Assign the defined properties and push them to the provider.
    Update,
    Delete,
    Merge,
    Decline,
    AddHook,
}

/// Operations run without listing entities first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionOp {
    CreateRepository,
    CreatePullRequest,
}

/// An extra option an instance action adds to its primary command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionOption {
    pub id: &'static str,
    pub short: Option<char>,
    pub long: &'static str,
    pub value_name: &'static str,
    pub help: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Registered as a `<type>-<action>` subcommand taking `suffix` arguments.
    Collection {
        suffix: &'static str,
        description: String,
        op: CollectionOp,
    },
    /// Registered as a `--<action>` flag on the primary command.
    Instance {
        description: String,
        options: Vec<ActionOption>,
        op: InstanceOp,
    },
}

impl Action {
    pub fn description(&self) -> &str {
        match self {
            Self::Collection { description, .. } | Self::Instance { description, .. } => {
                description
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub kind: EntityKind,
    pub name: &'static str,
    pub collection_name: &'static str,
    /// Attributes listed by default, `fullName` first.
    pub attributes: Vec<String>,
    pub actions: BTreeMap<&'static str, Action>,
}

impl TypeDescriptor {
    pub fn new(kind: EntityKind, extra: impl IntoIterator<Item = (&'static str, Action)>) -> Self {
        let mut actions = BTreeMap::new();
        actions.insert(
            "update",
            Action::Instance {
                description: format!("update {} attributes", kind.type_name()),
                options: vec![],
                op: InstanceOp::Update,
            },
        );
        actions.extend(extra);

        let mut attributes = vec![FULL_NAME.to_string()];
        attributes.extend(public_attribute_names(kind));

        Self {
            kind,
            name: kind.type_name(),
            collection_name: kind.collection_name(),
            attributes,
            actions,
        }
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub fn instance_actions(&self) -> impl Iterator<Item = (&'static str, &Action)> {
        self.actions
            .iter()
            .filter(|(_, action)| matches!(action, Action::Instance { .. }))
            .map(|(name, action)| (*name, action))
    }

    pub fn collection_actions(&self) -> impl Iterator<Item = (&'static str, &Action)> {
        self.actions
            .iter()
            .filter(|(_, action)| matches!(action, Action::Collection { .. }))
            .map(|(name, action)| (*name, action))
    }
}

/// Declared attributes of `kind` that are neither private nor the bare `name`.
pub fn public_attribute_names(kind: EntityKind) -> impl Iterator<Item = String> {
    kind.attributes()
        .iter()
        .filter(|spec| spec.name != "name" && !spec.private)
        .map(|spec| spec.name.to_string())
}

/// The descriptor table for every entity kind.
pub fn descriptors() -> Vec<TypeDescriptor> {
    EntityKind::ALL
        .into_iter()
        .map(|kind| TypeDescriptor::new(kind, kind_actions(kind)))
        .collect()
}

fn kind_actions(kind: EntityKind) -> Vec<(&'static str, Action)> {
    match kind {
        EntityKind::Provider => vec![(
            "create-repository",
            Action::Collection {
                suffix: "<names...>",
                description: "create repositories".to_string(),
                op: CollectionOp::CreateRepository,
            },
        )],
        EntityKind::Repository => vec![(
            "add-hook",
            Action::Instance {
                description: "add a hook".to_string(),
                options: vec![ActionOption {
                    id: "url",
                    short: Some('u'),
                    long: "url",
                    value_name: "URL",
                    help: "hook url to be called",
                }],
                op: InstanceOp::AddHook,
            },
        )],
        EntityKind::Branch => vec![(
            "create-pull-request",
            Action::Collection {
                suffix: "<names...>",
                description: "create a pull-request from a branch".to_string(),
                op: CollectionOp::CreatePullRequest,
            },
        )],
        EntityKind::Hook => vec![(
            "delete",
            Action::Instance {
                description: "delete a hook".to_string(),
                options: vec![],
                op: InstanceOp::Delete,
            },
        )],
        EntityKind::PullRequest => vec![
            (
                "merge",
                Action::Instance {
                    description: "merge the pr".to_string(),
                    options: vec![],
                    op: InstanceOp::Merge,
                },
            ),
            (
                "decline",
                Action::Instance {
                    description: "decline the pr".to_string(),
                    options: vec![],
                    op: InstanceOp::Decline,
                },
            ),
        ],
        _ => vec![],
    }
}
