use anyhow::Result;
use colored::Colorize;

use crate::cli::Options;
use crate::entity::AttributeValue;
use crate::entity::Entity;

/// Render one attribute value. Lists and sets are joined by a single space;
/// an undefined value renders empty when `undefined` is set and is skipped otherwise.
pub fn render_value(value: Option<AttributeValue>, undefined: bool) -> Option<String> {
    match value {
        Some(value) => Some(value.to_string()),
        None if undefined => Some(String::new()),
        None => None,
    }
}

/// Print the requested attributes of an entity.
///
/// With identifiers enabled the entity's full name heads the block and every
/// value is labelled, labels right-aligned to the longest requested name.
/// Without identifiers only the bare values are printed, one per line.
pub fn write_entity(
    out: &mut impl std::io::Write,
    entity: &Entity,
    attributes: &[String],
    options: &Options,
) -> Result<()> {
    if options.identifier {
        writeln!(out, "{}:", entity.full_name().bold())?;
    }

    let width = attributes.iter().map(|a| a.len()).max().unwrap_or(0) + 2;
    for name in attributes {
        let Some(value) = render_value(entity.attribute(name), options.undefined) else {
            continue;
        };
        if options.identifier {
            writeln!(out, "{:>width$}: {}", name, value, width = width)?;
        } else {
            writeln!(out, "{}", value)?;
        }
    }
    Ok(())
}
