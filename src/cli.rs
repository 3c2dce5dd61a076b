//! Command line construction from the descriptor table.
//!
//! Every descriptor becomes a primary `<type> [names...]` command. Collection
//! actions become `<type>-<action>` subcommands and instance actions become
//! `--<action>` flags on the primary command.

use std::collections::BTreeMap;

use anyhow::Context;
use anyhow::Result;
use clap::Arg;
use clap::ArgAction;
use clap::ArgGroup;
use clap::ArgMatches;
use clap::Args;
use clap::Command;
use clap::FromArgMatches;
use tracing::level_filters::LevelFilter;

use crate::descriptor::Action;
use crate::descriptor::TypeDescriptor;
use crate::entity::EntityKind;
use crate::entity::Properties;

const NAMES: &str = "names";
const INSTANCE_ACTION: &str = "instance-action";

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// log level trace
    #[arg(long, global = true)]
    pub trace: bool,

    /// log level debug
    #[arg(long, global = true)]
    pub debug: bool,

    /// output identifier before attribute values (default)
    #[arg(long, global = true, overrides_with = "no_identifier")]
    pub identifier: bool,

    /// do not output identifier, show attribute values only
    #[arg(long, global = true, overrides_with = "identifier")]
    pub no_identifier: bool,

    /// list attribute
    #[arg(
        short = 'a',
        long = "attribute",
        global = true,
        value_name = "ATTRIBUTES",
        value_delimiter = ','
    )]
    pub attributes: Vec<String>,

    /// output undefined attribute values as empty strings (default)
    #[arg(long, global = true, overrides_with = "no_undefined")]
    pub undefined: bool,

    /// do not output undefined attribute values
    #[arg(long, global = true, overrides_with = "undefined")]
    pub no_undefined: bool,

    /// output as json
    #[arg(long, global = true)]
    pub json: bool,

    /// define property
    #[arg(
        short = 'D',
        long = "define",
        global = true,
        value_name = "KEY=VALUE",
        value_parser = parse_definition
    )]
    pub define: Vec<(String, String)>,

    /// show cache statistics
    #[arg(long, global = true)]
    pub statistics: bool,

    /// do not cache provider responses
    #[arg(long, global = true)]
    pub no_cache: bool,
}

/// Parse a `key=value` definition. Only the first `=` separates key and value.
pub fn parse_definition(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

/// Options controlling a single run, derived from the command line.
#[derive(Debug, Clone)]
pub struct Options {
    pub json: bool,
    pub identifier: bool,
    pub undefined: bool,
    /// Attributes requested with `-a`, replacing the descriptor's list.
    pub attributes: Option<Vec<String>>,
    pub properties: Properties,
    /// Values of options contributed by instance actions.
    pub action_options: BTreeMap<String, String>,
    pub statistics: bool,
    pub cache: bool,
    pub log_level: LevelFilter,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            json: false,
            identifier: true,
            undefined: true,
            attributes: None,
            properties: Properties::new(),
            action_options: BTreeMap::new(),
            statistics: false,
            cache: true,
            log_level: LevelFilter::WARN,
        }
    }
}

impl From<GlobalArgs> for Options {
    fn from(args: GlobalArgs) -> Self {
        let log_level = if args.trace {
            LevelFilter::TRACE
        } else if args.debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::WARN
        };
        let attributes: Vec<String> = args
            .attributes
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Self {
            json: args.json,
            identifier: !args.no_identifier,
            undefined: !args.no_undefined,
            attributes: (!attributes.is_empty()).then_some(attributes),
            properties: args.define.into_iter().collect(),
            action_options: BTreeMap::new(),
            statistics: args.statistics,
            cache: !args.no_cache,
            log_level,
        }
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// List (and possibly act on) the entities matching `patterns`.
    List {
        kind: EntityKind,
        patterns: Vec<String>,
        action: Option<String>,
    },
    /// Run a collection action with its positional arguments.
    Execute {
        kind: EntityKind,
        action: String,
        names: Vec<String>,
    },
}

// -----------------------------------------------------------------------------
// Command builder

pub fn build_command(descriptors: &[TypeDescriptor]) -> Command {
    let mut command = Command::new("repo-util")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true);
    command = GlobalArgs::augment_args(command);

    for descriptor in descriptors {
        command = command.subcommand(primary_command(descriptor));
        for (name, action) in descriptor.collection_actions() {
            if let Action::Collection {
                suffix,
                description,
                ..
            } = action
            {
                let mut subcommand =
                    Command::new(format!("{}-{}", descriptor.name, name)).about(description.clone());
                for arg in suffix_args(suffix) {
                    subcommand = subcommand.arg(arg);
                }
                command = command.subcommand(subcommand);
            }
        }
    }

    command
}

fn primary_command(descriptor: &TypeDescriptor) -> Command {
    let mut command = Command::new(descriptor.name)
        .about(format!("list {}", descriptor.collection_name))
        .arg(
            Arg::new(NAMES)
                .value_name("NAME")
                .num_args(0..)
                .action(ArgAction::Append),
        )
        .group(ArgGroup::new(INSTANCE_ACTION).multiple(false));

    for (name, action) in descriptor.instance_actions() {
        if let Action::Instance {
            description,
            options,
            ..
        } = action
        {
            command = command.arg(
                Arg::new(name)
                    .long(name)
                    .help(description.clone())
                    .action(ArgAction::SetTrue)
                    .group(INSTANCE_ACTION),
            );
            for option in options {
                let mut arg = Arg::new(option.id)
                    .long(option.long)
                    .value_name(option.value_name)
                    .help(option.help);
                if let Some(short) = option.short {
                    arg = arg.short(short);
                }
                command = command.arg(arg);
            }
        }
    }

    command
}

/// Positional arguments for an action suffix such as `<names...>` or `[name]`.
pub fn suffix_args(suffix: &str) -> Vec<Arg> {
    suffix
        .split_whitespace()
        .filter_map(|token| {
            let (inner, required) = if let Some(inner) =
                token.strip_prefix('<').and_then(|t| t.strip_suffix('>'))
            {
                (inner, true)
            } else {
                (
                    token.strip_prefix('[').and_then(|t| t.strip_suffix(']'))?,
                    false,
                )
            };
            let (name, multiple) = match inner.strip_suffix("...") {
                Some(name) => (name, true),
                None => (inner, false),
            };
            let arg = Arg::new(name.to_string())
                .value_name(name.to_uppercase())
                .required(required);
            Some(if multiple {
                arg.num_args(1..).action(ArgAction::Append)
            } else {
                arg
            })
        })
        .collect()
}

// -----------------------------------------------------------------------------
// Invocation parsing

pub fn parse_invocation(
    descriptors: &[TypeDescriptor],
    matches: &ArgMatches,
) -> Result<(Invocation, Options)> {
    let (name, sub_matches) = matches.subcommand().context("No command given")?;
    let mut options: Options = GlobalArgs::from_arg_matches(sub_matches)?.into();

    for descriptor in descriptors {
        if descriptor.name == name {
            let patterns = strings(sub_matches, NAMES);
            let mut action = None;
            for (action_name, declared) in descriptor.instance_actions() {
                if sub_matches.get_flag(action_name) {
                    action = Some(action_name.to_string());
                }
                if let Action::Instance {
                    options: declared_options,
                    ..
                } = declared
                {
                    for option in declared_options {
                        if let Some(value) = sub_matches.get_one::<String>(option.id) {
                            options
                                .action_options
                                .insert(option.id.to_string(), value.clone());
                        }
                    }
                }
            }
            let invocation = Invocation::List {
                kind: descriptor.kind,
                patterns,
                action,
            };
            return Ok((invocation, options));
        }

        for (action_name, declared) in descriptor.collection_actions() {
            if format!("{}-{}", descriptor.name, action_name) != name {
                continue;
            }
            let Action::Collection { suffix, .. } = declared else {
                continue;
            };
            let names = suffix_args(suffix)
                .iter()
                .flat_map(|arg| strings(sub_matches, arg.get_id().as_str()))
                .collect();
            let invocation = Invocation::Execute {
                kind: descriptor.kind,
                action: action_name.to_string(),
                names,
            };
            return Ok((invocation, options));
        }
    }

    anyhow::bail!("Unknown command: {}", name)
}

fn strings(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}
