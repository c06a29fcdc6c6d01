//! Schema export
//!
//! Serializes a resolved schema, or a single table of it, back into one of
//! the document formats, a workbook or a CREATE TABLE script.

use similar::{ChangeTag, TextDiff};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::models::excel;
use crate::schema::generator::{create_table_sql, wrap_script};
use crate::schema::types::{Schema, Table};

/// Output formats understood by `conv`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Sql,
    Json,
    Yaml,
    Yml,
    Xlsx,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Sql => "sql",
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
            ExportFormat::Yml => "yml",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    /// Binary formats cannot go to stdout
    pub fn is_binary(&self) -> bool {
        *self == ExportFormat::Xlsx
    }

    /// The format named by a file extension, if any
    pub fn from_extension(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }

    /// An explicit format wins, then the output extension, then `sql`
    pub fn detect(format: Option<&str>, output: Option<&Path>) -> Result<Self> {
        if let Some(format) = format {
            return format.parse();
        }
        Ok(output.and_then(Self::from_extension).unwrap_or(ExportFormat::Sql))
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sql" => Ok(ExportFormat::Sql),
            "json" => Ok(ExportFormat::Json),
            "yaml" => Ok(ExportFormat::Yaml),
            "yml" => Ok(ExportFormat::Yml),
            "xlsx" => Ok(ExportFormat::Xlsx),
            other => Err(Error::InvalidInput(format!(
                "output format must be one of [sql, json, yaml, yml, xlsx]: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialize every table of `schema`
pub fn marshal_schema(schema: &Schema, format: ExportFormat, foreign_key: bool) -> Result<Vec<u8>> {
    marshal_tables(schema.tables(), format, foreign_key)
}

/// Serialize one table as a single-table document
pub fn marshal_table(table: &Table, format: ExportFormat, foreign_key: bool) -> Result<Vec<u8>> {
    marshal_tables(std::slice::from_ref(table), format, foreign_key)
}

fn marshal_tables(tables: &[Table], format: ExportFormat, foreign_key: bool) -> Result<Vec<u8>> {
    let text = match format {
        ExportFormat::Xlsx => return excel::write_tables(tables),
        ExportFormat::Json => serde_json::to_string_pretty(tables)?,
        ExportFormat::Yaml | ExportFormat::Yml => serde_yaml::to_string(tables)?,
        ExportFormat::Sql => create_script(tables, foreign_key)?,
    };
    Ok(text.into_bytes())
}

/// Every table's CREATE TABLE text inside the script wrapper
pub fn create_script(tables: &[Table], foreign_key: bool) -> Result<String> {
    let mut body = String::new();
    for table in tables {
        body.push_str(&create_table_sql(table, foreign_key)?);
    }
    Ok(wrap_script(&body))
}

/// Line diff of the CREATE scripts of two schemas.
///
/// Only changed lines are kept, each prefixed with `-` or `+`. Identical
/// schemas give an empty string.
pub fn create_sql_diff(old: &Schema, new: &Schema, foreign_key: bool) -> Result<String> {
    let old_sql = create_script(old.tables(), foreign_key)?;
    let new_sql = create_script(new.tables(), foreign_key)?;

    let diff = TextDiff::from_lines(&old_sql, &new_sql);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => '-',
            ChangeTag::Insert => '+',
            ChangeTag::Equal => continue,
        };
        out.push(sign);
        out.push_str(change.value());
        if change.missing_newline() {
            out.push('\n');
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{Column, Index};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn users(with_email: bool) -> Schema {
        let mut table = Table::new("Users").engine("InnoDB");
        table.add_column(Column::new("id", "bigint").not_null().primary_key(1));
        if with_email {
            table.add_column(Column::new("email", "varchar(255)").not_null());
            table.add_index(Index::new("idx_email", &["email"]).unique());
        }
        Schema::resolve(vec![table]).unwrap()
    }

    #[rstest]
    #[case(Some("json"), None, ExportFormat::Json)]
    #[case(None, Some("out/tables.yml"), ExportFormat::Yml)]
    #[case(None, Some("out/tables.yaml"), ExportFormat::Yaml)]
    #[case(None, Some("out/dir"), ExportFormat::Sql)]
    #[case(None, None, ExportFormat::Sql)]
    #[case(Some("sql"), Some("tables.json"), ExportFormat::Sql)]
    #[case(None, Some("book.xlsx"), ExportFormat::Xlsx)]
    fn test_detect_format(#[case] format: Option<&str>, #[case] output: Option<&str>, #[case] expected: ExportFormat) {
        assert_eq!(ExportFormat::detect(format, output.map(Path::new)).unwrap(), expected);
    }

    #[test]
    fn test_unknown_format() {
        assert!(matches!(ExportFormat::detect(Some("csv"), None), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_marshal_json_keys() {
        let bytes = marshal_schema(&users(true), ExportFormat::Json, false).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value[0]["Name"], "Users");
        assert_eq!(value[0]["Columns"][0]["Type"], "bigint");
        assert_eq!(value[0]["Columns"][0]["PrimaryKey"], 1);
        assert_eq!(value[0]["Indexes"][0]["ColumnNames"][0], "email");
        assert!(value[0]["Columns"][1].get("Default").is_none());
    }

    #[test]
    fn test_marshal_yaml_reloads() {
        let bytes = marshal_schema(&users(true), ExportFormat::Yaml, false).unwrap();
        let tables: Vec<Table> = serde_yaml::from_slice(&bytes).unwrap();
        let schema = Schema::resolve(tables).unwrap();

        assert_eq!(schema.table("users").unwrap().column_names(), vec!["id", "email"]);
    }

    #[test]
    fn test_marshal_xlsx_reloads() {
        let bytes = marshal_schema(&users(true), ExportFormat::Xlsx, false).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.xlsx");
        std::fs::write(&path, bytes).unwrap();

        let schema = Schema::resolve(excel::read_tables(&path).unwrap()).unwrap();
        let users = schema.table("users").unwrap();
        assert_eq!(users.column_names(), vec!["id", "email"]);
        assert!(users.index("idx_email").unwrap().unique);
        assert!(ExportFormat::Xlsx.is_binary());
    }

    #[test]
    fn test_marshal_table_sql() {
        let schema = users(false);
        let table = schema.table("users").unwrap();
        let sql = String::from_utf8(marshal_table(table, ExportFormat::Sql, false).unwrap()).unwrap();

        assert!(sql.starts_with("\nBEGIN;\n"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS `users` (\n  `id` bigint(20) NOT NULL,\n  PRIMARY KEY (`id`)\n)"));
        assert!(sql.trim_end().ends_with("COMMIT;"));
    }

    #[test]
    fn test_create_sql_diff() {
        let diff = create_sql_diff(&users(false), &users(true), false).unwrap();

        let mut lines: Vec<&str> = diff.lines().collect();
        lines.sort_unstable();
        assert_eq!(
            lines,
            vec![
                "+  PRIMARY KEY (`id`),",
                "+  UNIQUE INDEX `idx_email` (`email`)",
                "+  `email` varchar(255) NOT NULL,",
                "-  PRIMARY KEY (`id`)",
            ]
        );
    }

    #[test]
    fn test_create_sql_diff_identical() {
        assert_eq!(create_sql_diff(&users(true), &users(true), true).unwrap(), "");
    }
}
