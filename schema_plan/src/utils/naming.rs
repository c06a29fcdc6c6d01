//! Naming utilities for schema_plan
//!
//! Identifier normalization, quoting, and foreign key constraint naming.

use inflector::Inflector;
use std::collections::HashMap;

/// Longest constraint name we emit, leaving headroom under MySQL's 64
pub const MAX_CONSTRAINT_NAME_LEN: usize = 60;

/// Prefix of every synthesized foreign key constraint
pub const CONSTRAINT_PREFIX: &str = "ref_";

/// Normalize an identifier to lower snake case.
///
/// Names that are already lower case are only trimmed, so digits and
/// existing underscores survive untouched.
pub fn lower_snake(name: &str) -> String {
    let name = name.trim();
    if name.chars().any(|c| c.is_uppercase()) {
        name.to_snake_case()
    } else {
        name.to_string()
    }
}

/// Quote a MySQL identifier with backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a string literal with single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Find the first pair of names that collide after lower-snake normalization
pub fn find_duplicate<'a, I>(names: I) -> Option<(String, String)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashMap::<String, &str>::new();

    for name in names {
        let key = lower_snake(name);
        if let Some(existing) = seen.get(&key) {
            return Some((existing.to_string(), name.to_string()));
        }
        seen.insert(key, name);
    }

    None
}

/// Foreign key constraint name for `table.column -> ref_table.ref_column`.
///
/// Falls back to shorter forms when the full name exceeds
/// [`MAX_CONSTRAINT_NAME_LEN`]; ADD and DROP both go through here so their
/// names always agree.
pub fn constraint_name(table: &str, column: &str, ref_table: &str, ref_column: &str) -> String {
    let candidates = [
        format!("{CONSTRAINT_PREFIX}{table}_{column}_{ref_table}_{ref_column}"),
        format!("{CONSTRAINT_PREFIX}{table}_{column}_{ref_table}"),
    ];

    candidates
        .into_iter()
        .find(|name| name.len() <= MAX_CONSTRAINT_NAME_LEN)
        .unwrap_or_else(|| format!("{CONSTRAINT_PREFIX}{table}_{column}"))
}
