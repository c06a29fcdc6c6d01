//! Text generation from schemas
//!
//! Templates are Jinja-style (minijinja). A single render sees `tables`; a
//! per-table render also sees `table`, and its output path is itself a
//! template rendered with the same context.

use inflector::Inflector;
use minijinja::{context, Environment};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::data::TableFilter;
use crate::schema::types::{Column, Index, Schema, Table};

static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n+").expect("newline run pattern"));

/// What a generated file does when its path already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OverwriteMode {
    /// Replace the file
    #[default]
    Force,
    /// Keep the existing file
    Skip,
    /// Remove each output directory before writing
    Clear,
}

/// What happened to one generated file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct TableView {
    pub name: String,
    pub key: String,
    pub engine: Option<String>,
    pub default_charset: Option<String>,
    pub comment: Option<String>,
    pub columns: Vec<ColumnView>,
    pub indexes: Vec<IndexView>,
    /// Primary key column keys in ordinal order
    pub primary_keys: Vec<String>,
    pub first_pk_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ColumnView {
    pub name: String,
    pub key: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub not_null: bool,
    pub primary_key: u32,
    pub default: Option<String>,
    pub extra: Option<String>,
    pub reference: Option<String>,
    pub comment: Option<String>,
    pub is_unique: bool,
    pub is_auto_increment: bool,
}

#[derive(Debug, Serialize)]
pub struct IndexView {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub comment: Option<String>,
}

impl TableView {
    pub fn new(table: &Table) -> Self {
        let primary_keys: Vec<String> = table.primary_keys().map(|c| c.key().to_string()).collect();
        Self {
            name: table.name.clone(),
            key: table.key().to_string(),
            engine: table.engine.clone(),
            default_charset: table.default_charset.clone(),
            comment: table.comment.clone(),
            columns: table.columns.iter().map(|c| ColumnView::new(table, c)).collect(),
            indexes: table.indexes.iter().map(IndexView::new).collect(),
            first_pk_name: primary_keys.first().cloned(),
            primary_keys,
        }
    }
}

impl ColumnView {
    fn new(table: &Table, column: &Column) -> Self {
        Self {
            name: column.name.clone(),
            key: column.key().to_string(),
            data_type: column.data_type.clone(),
            not_null: column.not_null,
            primary_key: column.primary_key,
            default: column.default.clone(),
            extra: column.extra.clone(),
            reference: column.reference.clone(),
            comment: column.comment.clone(),
            is_unique: is_unique(table, column),
            is_auto_increment: column.extra.as_deref() == Some("AUTO_INCREMENT"),
        }
    }
}

impl IndexView {
    fn new(index: &Index) -> Self {
        Self {
            name: index.name.clone(),
            columns: index.column_names.clone(),
            unique: index.unique,
            comment: index.comment.clone(),
        }
    }
}

/// The sole primary key column, or the only column of a unique index
fn is_unique(table: &Table, column: &Column) -> bool {
    if column.primary_key != 0 && table.primary_keys().count() == 1 {
        return true;
    }
    column
        .index_ids()
        .iter()
        .map(|&i| &table.indexes[i])
        .any(|index| index.unique && index.column_names.len() == 1)
}

/// Collapse every run of newlines into one
pub fn squeeze_blank_lines(text: &str) -> String {
    BLANK_LINES.replace_all(text, "\n").into_owned()
}

/// Jinja environment with the naming filters
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_filter("snake", |value: String| value.to_snake_case());
        env.add_filter("camel", |value: String| value.to_camel_case());
        env.add_filter("pascal", |value: String| value.to_pascal_case());
        env.add_filter("plural", |value: String| value.to_plural());
        env.add_filter("singular", |value: String| value.to_singular());
        Self { env }
    }

    /// Render `source` once over every table
    pub fn render_single(&self, source: &str, tables: &[&Table]) -> Result<String> {
        let views: Vec<TableView> = tables.iter().map(|t| TableView::new(t)).collect();
        let rendered = self.env.template_from_str(source)?.render(context! { tables => views })?;
        Ok(squeeze_blank_lines(&rendered))
    }

    /// Render `source` once per table, keyed by the rendered `path_pattern`
    pub fn render_each(&self, source: &str, path_pattern: &str, tables: &[&Table]) -> Result<BTreeMap<PathBuf, String>> {
        let template = self.env.template_from_str(source)?;
        let path_template = self.env.template_from_str(path_pattern)?;
        let views: Vec<TableView> = tables.iter().map(|t| TableView::new(t)).collect();

        let mut outputs = BTreeMap::new();
        for view in &views {
            let ctx = context! { tables => &views, table => view };
            let path = PathBuf::from(path_template.render(&ctx)?.trim());
            let rendered = squeeze_blank_lines(&template.render(&ctx)?);
            if outputs.insert(path.clone(), rendered).is_some() {
                return Err(Error::InvalidInput(format!(
                    "two tables render to the same output path: {}",
                    path.display()
                )));
            }
        }
        Ok(outputs)
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Tables selected by `tables` (all when empty) minus `ignore_tables`,
/// comparing lower-snake keys
pub fn select_tables<'a>(schema: &'a Schema, tables: &[String], ignore_tables: &[String]) -> Vec<&'a Table> {
    let filter = TableFilter {
        tables: tables.to_vec(),
        ignore_tables: ignore_tables.to_vec(),
    };
    schema.tables().iter().filter(|t| filter.accepts(t.key())).collect()
}

/// Write rendered files under `mode`, creating their directories
pub fn write_generated(outputs: &BTreeMap<PathBuf, String>, mode: OverwriteMode) -> Result<Vec<(PathBuf, WriteOutcome)>> {
    let dirs: Vec<&Path> = {
        let mut dirs: Vec<&Path> = outputs
            .keys()
            .filter_map(|path| path.parent())
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect();
        dirs.sort();
        dirs.dedup();
        dirs
    };

    for dir in dirs {
        if mode == OverwriteMode::Clear && dir.exists() {
            tracing::info!(dir = %dir.display(), "Clearing output directory");
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;
    }

    let mut outcomes = Vec::with_capacity(outputs.len());
    for (path, content) in outputs {
        if mode == OverwriteMode::Skip && path.exists() {
            outcomes.push((path.clone(), WriteOutcome::Skipped));
            continue;
        }
        fs::write(path, content)?;
        outcomes.push((path.clone(), WriteOutcome::Written));
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::Index;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::tempdir;

    fn schema() -> Schema {
        let mut users = Table::new("UserAccounts");
        users.add_column(Column::new("id", "bigint").not_null().primary_key(1).extra("auto_increment"));
        users.add_column(Column::new("email", "varchar(255)").not_null());
        users.add_column(Column::new("nick", "varchar(32)"));
        users.add_index(Index::new("idx_email", &["email"]).unique());
        users.add_index(Index::new("idx_nick_email", &["nick", "email"]).unique());

        let mut tags = Table::new("tags");
        tags.add_column(Column::new("post_id", "bigint").not_null().primary_key(1));
        tags.add_column(Column::new("name", "varchar(32)").not_null().primary_key(2));
        Schema::resolve(vec![users, tags]).unwrap()
    }

    #[test]
    fn test_table_view_flags() {
        let schema = schema();
        let view = TableView::new(schema.table("user_accounts").unwrap());

        assert_eq!(view.first_pk_name.as_deref(), Some("id"));
        let flags: Vec<(&str, bool, bool)> = view
            .columns
            .iter()
            .map(|c| (c.key.as_str(), c.is_unique, c.is_auto_increment))
            .collect();
        assert_eq!(flags, vec![("id", true, true), ("email", true, false), ("nick", false, false)]);

        let tags = TableView::new(schema.table("tags").unwrap());
        assert_eq!(tags.primary_keys, vec!["post_id", "name"]);
        assert!(!tags.columns[0].is_unique);
    }

    #[test]
    fn test_render_single() {
        let schema = schema();
        let tables = select_tables(&schema, &[], &["tags".to_string()]);
        let source = "{% for t in tables %}\n\nstruct {{ t.key | pascal }};\n\n{% for c in t.columns %}{{ c.key | camel }}:{{ c.type }}\n{% endfor %}{% endfor %}";

        let rendered = TemplateRenderer::new().render_single(source, &tables).unwrap();
        assert_eq!(
            rendered,
            "\nstruct UserAccounts;\nid:bigint\nemail:varchar(255)\nnick:varchar(32)\n"
        );
    }

    #[rstest]
    #[case("a\n\n\nb\n", "a\nb\n")]
    #[case("\n\n", "\n")]
    #[case("plain", "plain")]
    fn test_squeeze_blank_lines(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(squeeze_blank_lines(text), expected);
    }

    #[test]
    fn test_render_each_and_write() {
        let schema = schema();
        let tables = select_tables(&schema, &[], &[]);
        let dir = tempdir().unwrap();
        let pattern = format!("{}/gen/{{{{ table.key | singular }}}}.txt", dir.path().display());

        let renderer = TemplateRenderer::new();
        let outputs = renderer
            .render_each("{{ table.name }} of {{ tables | length }}", &pattern, &tables)
            .unwrap();
        let user_path = dir.path().join("gen/user_account.txt");
        assert_eq!(outputs.get(&user_path).map(String::as_str), Some("UserAccounts of 2"));

        let outcomes = write_generated(&outputs, OverwriteMode::Force).unwrap();
        assert!(outcomes.iter().all(|(_, o)| *o == WriteOutcome::Written));
        assert_eq!(fs::read_to_string(&user_path).unwrap(), "UserAccounts of 2");

        fs::write(&user_path, "edited").unwrap();
        let outcomes = write_generated(&outputs, OverwriteMode::Skip).unwrap();
        assert!(outcomes.contains(&(user_path.clone(), WriteOutcome::Skipped)));
        assert_eq!(fs::read_to_string(&user_path).unwrap(), "edited");

        let stray = dir.path().join("gen/stray.txt");
        fs::write(&stray, "old").unwrap();
        write_generated(&outputs, OverwriteMode::Clear).unwrap();
        assert!(!stray.exists());
        assert_eq!(fs::read_to_string(&user_path).unwrap(), "UserAccounts of 2");
    }

    #[test]
    fn test_colliding_output_paths() {
        let schema = schema();
        let tables = select_tables(&schema, &[], &[]);
        let err = TemplateRenderer::new().render_each("x", "same.txt", &tables).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_template_syntax_error() {
        let err = TemplateRenderer::new().render_single("{% for %}", &[]).unwrap_err();
        assert!(matches!(err, Error::TemplateError(_)));
    }
}
