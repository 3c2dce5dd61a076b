use anyhow::Context;
use anyhow::Result;
use regex::Regex;

/// Pattern used when no name patterns are given on the command line.
pub const CATCH_ALL: &str = "*";

/// A name pattern where `*` matches any run of characters (including `/` and `#`)
/// and `?` matches a single character. Matching ignores case.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let mut expr = String::from("(?i)^");
        for c in pattern.chars() {
            match c {
                '*' => {
                    if !expr.ends_with(".*") {
                        expr.push_str(".*");
                    }
                }
                '?' => expr.push('.'),
                c => expr.push_str(&regex::escape(&c.to_string())),
            }
        }
        expr.push('$');

        let regex =
            Regex::new(&expr).with_context(|| format!("Invalid name pattern: {}", pattern))?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Whether a pattern (or pattern fragment) contains no wildcards.
pub fn is_literal(pattern: &str) -> bool {
    !pattern.contains(['*', '?'])
}

/// Substitute the catch-all pattern for an empty pattern list.
pub fn normalize(patterns: Vec<String>) -> Vec<String> {
    if patterns.is_empty() {
        vec![CATCH_ALL.to_string()]
    } else {
        patterns
    }
}

/// Split an `owner/repo#child` pattern into its repository and child parts.
/// Without `#` every child of the matching repositories is selected.
pub fn split_child(pattern: &str) -> (&str, &str) {
    pattern.split_once('#').unwrap_or((pattern, CATCH_ALL))
}

pub fn compile(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns.iter().map(|p| Pattern::new(p)).collect()
}

pub fn matches_any(patterns: &[Pattern], name: &str) -> bool {
    patterns.iter().any(|p| p.is_match(name))
}
