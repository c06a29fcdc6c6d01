//! MySQL type and default value normalization
//!
//! Decides when two column definitions mean the same thing, and how a default
//! literal has to be quoted when it is written back out.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::schema::types::Column;
use crate::utils::naming::quote_literal;

static NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(bool|tinyint|smallint|mediumint|int|bigint|float|double|decimal|numeric|bit)")
        .expect("numeric type pattern")
});

static TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(date|datetime|timestamp|time|year)").expect("time type pattern"));

static STRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(tinytext|text|mediumtext|longtext|varchar|char|enum|set|json|binary|varbinary)")
        .expect("string type pattern")
});

static BLOB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(tinyblob|blob|mediumblob|longblob)").expect("blob type pattern")
});

/// Broad MySQL type family, used to decide default quoting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Numeric,
    Time,
    String,
    Blob,
}

/// Classify a raw type string. Unknown types are an error rather than a guess.
pub fn type_family(data_type: &str) -> Result<TypeFamily> {
    let t = data_type.trim().to_lowercase();
    if NUMERIC.is_match(&t) {
        Ok(TypeFamily::Numeric)
    } else if TIME.is_match(&t) {
        Ok(TypeFamily::Time)
    } else if STRING.is_match(&t) {
        Ok(TypeFamily::String)
    } else if BLOB.is_match(&t) {
        Ok(TypeFamily::Blob)
    } else {
        Err(Error::InvalidType(data_type.to_string()))
    }
}

pub fn is_numeric(data_type: &str) -> Result<bool> {
    Ok(type_family(data_type)? == TypeFamily::Numeric)
}

pub fn is_time(data_type: &str) -> bool {
    TIME.is_match(&data_type.trim().to_lowercase())
}

/// Expand bare integer-ish keywords to the display width MySQL reports for them
pub fn normalize_type(data_type: &str) -> &str {
    match data_type {
        "bigint" => "bigint(20)",
        "int" => "int(11)",
        "mediumint" => "mediumint(9)",
        "smallint" => "smallint(6)",
        "tinyint" => "tinyint(4)",
        "boolean" | "bool" => "tinyint(1)",
        "year" => "year(4)",
        other => other,
    }
}

pub fn is_same_type(a: &str, b: &str) -> bool {
    normalize_type(a) == normalize_type(b)
}

/// Canonical default literal for a column, or `None` when it has no default.
///
/// Numeric defaults and `CURRENT_TIMESTAMP`/`NOW()` on temporal columns stay
/// bare; everything else is single-quoted with embedded quotes doubled.
/// Only single quotes are stripped from the input.
pub fn normalize_default(column: &Column) -> Result<Option<String>> {
    let Some(default) = &column.default else {
        return Ok(None);
    };
    let value = default.trim().trim_matches('\'');

    if is_numeric(&column.data_type)? {
        return Ok(Some(value.to_string()));
    }

    let upper = value.to_uppercase();
    if is_time(&column.data_type) && (upper == "CURRENT_TIMESTAMP" || upper == "NOW()") {
        return Ok(Some(value.to_string()));
    }

    Ok(Some(quote_literal(value)))
}
