//! Migration generator
//!
//! Renders DDL for single tables, columns, indexes and foreign keys, and walks
//! a [`SchemaDiff`] in a fixed phase order to build a forward (`alter`) and a
//! reverse (`revert`) script side by side.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::config::DiffFormat;
use crate::error::{Error, Result};
use crate::schema::diff::{ColumnRename, MoveOperation, SchemaDiff, TableDiff};
use crate::schema::normalize::{normalize_default, normalize_type};
use crate::schema::types::{Column, Index, Table};
use crate::utils::naming::{constraint_name, lower_snake, quote_identifier, quote_literal};

/// Opens every script: disables key checks and relaxes the SQL mode
pub const SQL_PREFIX: &str = "
BEGIN;
SET @OLD_UNIQUE_CHECKS=@@UNIQUE_CHECKS, UNIQUE_CHECKS=0;
SET @OLD_FOREIGN_KEY_CHECKS=@@FOREIGN_KEY_CHECKS, FOREIGN_KEY_CHECKS=0;
SET @OLD_SQL_MODE=@@SQL_MODE, SQL_MODE='STRICT_TRANS_TABLES,STRICT_ALL_TABLES,NO_ENGINE_SUBSTITUTION,ALLOW_INVALID_DATES';

";

/// Restores the session settings saved by [`SQL_PREFIX`]
pub const SQL_SUFFIX: &str = "
SET SQL_MODE=@OLD_SQL_MODE;
SET FOREIGN_KEY_CHECKS=@OLD_FOREIGN_KEY_CHECKS;
SET UNIQUE_CHECKS=@OLD_UNIQUE_CHECKS;
COMMIT;

";

const GOOSE_UP: &str = "
-- +goose Up
-- SQL in section 'Up' is executed when this migration is applied
";

const GOOSE_DOWN: &str = "
-- +goose Down
-- SQL section 'Down' is executed when this migration is rolled back
";

/// Wrap a statement sequence in the transactional prologue and epilogue
pub fn wrap_script(body: &str) -> String {
    format!("{}{}{}", SQL_PREFIX, body, SQL_SUFFIX)
}

/// Where a column lands when it is added, renamed or moved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    First,
    After(String),
}

impl Placement {
    /// Placement derived from the column's predecessor in its own table
    pub fn of(table: &Table, column: &Column) -> Self {
        match table.predecessor(column) {
            Some(previous) => Placement::After(previous.key().to_string()),
            None => Placement::First,
        }
    }
}

impl From<&MoveOperation> for Placement {
    fn from(op: &MoveOperation) -> Self {
        match &op.after {
            Some(after) => Placement::After(after.clone()),
            None => Placement::First,
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::First => write!(f, "FIRST"),
            Placement::After(name) => write!(f, "AFTER {}", quote_identifier(name)),
        }
    }
}

/// Full column definition, e.g. `` `id` int(11) NOT NULL AUTO_INCREMENT ``
pub fn column_definition(column: &Column) -> Result<String> {
    let mut sql = format!(
        "{} {}",
        quote_identifier(column.key()),
        normalize_type(&column.data_type)
    );
    if column.not_null {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = normalize_default(column)? {
        sql.push_str(" DEFAULT ");
        sql.push_str(&default);
    }
    if let Some(extra) = &column.extra {
        sql.push(' ');
        sql.push_str(extra);
    }
    if let Some(comment) = &column.comment {
        sql.push_str(" COMMENT ");
        sql.push_str(&quote_literal(comment));
    }
    Ok(sql)
}

/// Full index definition; this text is also the index's identity when diffing
pub fn index_definition(table: &Table, index: &Index) -> String {
    let kind = match index.index_type.as_deref().map(str::to_uppercase).as_deref() {
        Some("FULLTEXT") => "FULLTEXT INDEX",
        Some("SPATIAL") => "SPATIAL INDEX",
        _ if index.unique => "UNIQUE INDEX",
        _ => "INDEX",
    };
    let columns: Vec<String> = table
        .index_columns(index)
        .map(|c| quote_identifier(c.key()))
        .collect();

    format!("{} {} ({})", kind, quote_identifier(&index.name), columns.join(", "))
}

/// CREATE TABLE text for a whole table, with foreign keys appended when asked
pub fn create_table_sql(table: &Table, foreign_key: bool) -> Result<String> {
    let mut sql = String::from("\n");
    sql.push_str("-- -----------------------------------------------------\n");
    sql.push_str(&format!("-- Table `{}`\n", table.name));
    sql.push_str("-- -----------------------------------------------------\n");
    sql.push_str(&format!(
        "CREATE TABLE IF NOT EXISTS {} (\n",
        quote_identifier(table.key())
    ));

    let mut definitions = Vec::with_capacity(table.columns.len() + table.indexes.len() + 1);
    for column in &table.columns {
        definitions.push(format!("  {}", column_definition(column)?));
    }

    let primary_keys: Vec<String> = table.primary_keys().map(|c| quote_identifier(c.key())).collect();
    if !primary_keys.is_empty() {
        definitions.push(format!("  PRIMARY KEY ({})", primary_keys.join(", ")));
    }

    for index in &table.indexes {
        definitions.push(format!("  {}", index_definition(table, index)));
    }

    sql.push_str(&definitions.join(",\n"));
    sql.push_str("\n)");

    if let Some(engine) = &table.engine {
        sql.push_str(&format!("\nENGINE = {}", engine));
    }
    if let Some(charset) = &table.default_charset {
        sql.push_str(&format!("\nDEFAULT CHARACTER SET = {}", charset));
    }
    if let Some(comment) = &table.comment {
        sql.push_str(&format!("\nCOMMENT = {}", quote_literal(comment)));
    }
    sql.push_str(";\n");

    if foreign_key {
        for column in table.columns.iter().filter(|c| c.has_reference()) {
            sql.push_str(&add_foreign_key_sql(table, column)?);
        }
    }
    sql.push('\n');

    Ok(sql)
}

pub fn drop_table_sql(table: &Table) -> String {
    format!("DROP TABLE IF EXISTS {};\n", quote_identifier(table.key()))
}

/// Restate engine, default charset and comment
pub fn alter_table_sql(table: &Table) -> String {
    let mut sql = format!("ALTER TABLE {}", quote_identifier(table.key()));
    if let Some(engine) = &table.engine {
        sql.push_str(&format!(" ENGINE={}", engine));
    }
    if let Some(charset) = &table.default_charset {
        sql.push_str(&format!(" DEFAULT CHARSET={}", charset));
    }
    sql.push_str(&format!(
        " COMMENT={};\n",
        quote_literal(table.comment.as_deref().unwrap_or(""))
    ));
    sql
}

pub fn add_column_sql(table: &Table, column: &Column, placement: &Placement) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} ADD COLUMN {} {};\n",
        quote_identifier(table.key()),
        column_definition(column)?,
        placement
    ))
}

pub fn drop_column_sql(table: &Table, column: &Column) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {};\n",
        quote_identifier(table.key()),
        quote_identifier(column.key())
    )
}

/// Full restatement of a column, optionally moving it
pub fn modify_column_sql(table: &Table, column: &Column, placement: Option<&Placement>) -> Result<String> {
    let mut sql = format!(
        "ALTER TABLE {} MODIFY COLUMN {}",
        quote_identifier(table.key()),
        column_definition(column)?
    );
    if let Some(placement) = placement {
        sql.push_str(&format!(" {}", placement));
    }
    sql.push_str(";\n");
    Ok(sql)
}

/// Rename `current` into the definition of `target`
pub fn rename_column_sql(table: &Table, current: &Column, target: &Column, placement: &Placement) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} CHANGE {} {} {};\n",
        quote_identifier(table.key()),
        quote_identifier(current.key()),
        column_definition(target)?,
        placement
    ))
}

pub fn add_index_sql(table: &Table, index: &Index) -> String {
    format!(
        "ALTER TABLE {} ADD {};\n",
        quote_identifier(table.key()),
        index_definition(table, index)
    )
}

pub fn drop_index_sql(table: &Table, index: &Index) -> String {
    format!(
        "ALTER TABLE {} DROP INDEX {};\n",
        quote_identifier(table.key()),
        quote_identifier(&index.name)
    )
}

/// Constraint name and target of a referencing column
fn foreign_key_parts(table: &Table, column: &Column) -> Result<(String, String, String)> {
    let (ref_table, ref_column) = column
        .reference_target(table.key())?
        .ok_or_else(|| Error::MalformedReference {
            table: table.key().to_string(),
            column: column.name.clone(),
            reference: String::new(),
        })?;
    let ref_table = lower_snake(&ref_table);
    let ref_column = lower_snake(&ref_column);
    let name = constraint_name(table.key(), column.key(), &ref_table, &ref_column);
    Ok((name, ref_table, ref_column))
}

pub fn add_foreign_key_sql(table: &Table, column: &Column) -> Result<String> {
    let (name, ref_table, ref_column) = foreign_key_parts(table, column)?;
    Ok(format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({});\n",
        quote_identifier(table.key()),
        quote_identifier(&name),
        quote_identifier(column.key()),
        quote_identifier(&ref_table),
        quote_identifier(&ref_column)
    ))
}

pub fn drop_foreign_key_sql(table: &Table, column: &Column) -> Result<String> {
    let (name, _, _) = foreign_key_parts(table, column)?;
    Ok(format!(
        "ALTER TABLE {} DROP FOREIGN KEY {};\n",
        quote_identifier(table.key()),
        quote_identifier(&name)
    ))
}

/// Forward and reverse statement sequences produced by one diff pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationScript {
    pub alter: String,
    pub revert: String,
}

impl MigrationScript {
    /// No forward statements means nothing to migrate
    pub fn is_empty(&self) -> bool {
        self.alter.is_empty()
    }

    /// The wrapped forward script, or nothing when there is no change
    pub fn to_sql(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        wrap_script(&self.alter)
    }

    /// Goose migration with an Up and a Down section
    pub fn to_goose(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!(
            "{}{}{}{}",
            GOOSE_UP,
            wrap_script(&self.alter),
            GOOSE_DOWN,
            wrap_script(&self.revert)
        )
    }

    /// Render as `sql` or `goose`; `diff` is rendered from CREATE text instead
    pub fn render(&self, format: DiffFormat) -> Result<String> {
        match format {
            DiffFormat::Sql => Ok(self.to_sql()),
            DiffFormat::Goose => Ok(self.to_goose()),
            DiffFormat::Diff => Err(Error::InvalidInput(
                "the diff format is rendered from table definitions, not from a migration script".to_string(),
            )),
        }
    }
}

/// Walks a schema diff phase by phase across all tables
pub struct MigrationGenerator<'d, 'a> {
    diff: &'d SchemaDiff<'a>,
    alter: String,
    revert: String,
}

impl<'d, 'a> MigrationGenerator<'d, 'a> {
    /// Create a new migration generator
    pub fn new(diff: &'d SchemaDiff<'a>) -> Self {
        Self {
            diff,
            alter: String::new(),
            revert: String::new(),
        }
    }

    /// Generate both scripts. Either both complete or an error is returned.
    pub fn generate(mut self) -> Result<MigrationScript> {
        self.drop_removed_tables()?;
        self.create_added_tables()?;
        self.alter_table_attributes();
        self.add_and_rename_columns()?;
        self.update_indexes();
        self.update_foreign_keys()?;
        self.drop_removed_columns()?;
        self.modify_changed_columns()?;
        self.reorder_columns()?;

        tracing::debug!(
            alter_bytes = self.alter.len(),
            revert_bytes = self.revert.len(),
            "Generated migration scripts"
        );

        Ok(MigrationScript {
            alter: self.alter,
            revert: self.revert,
        })
    }

    fn changes(&self) -> &'d [TableDiff<'a>] {
        &self.diff.table_changes
    }

    fn drop_removed_tables(&mut self) -> Result<()> {
        for table in &self.diff.tables_to_drop {
            self.alter.push_str(&drop_table_sql(table));
            self.revert.push_str(&create_table_sql(table, self.diff.foreign_key)?);
        }
        Ok(())
    }

    fn create_added_tables(&mut self) -> Result<()> {
        for table in &self.diff.tables_to_create {
            self.alter.push_str(&create_table_sql(table, self.diff.foreign_key)?);
            self.revert.push_str(&drop_table_sql(table));
        }
        Ok(())
    }

    fn alter_table_attributes(&mut self) {
        for change in self.changes().iter().filter(|c| c.attributes_changed) {
            self.alter.push_str(&alter_table_sql(change.new));
            self.revert.push_str(&alter_table_sql(change.old));
        }
    }

    /// Adds and renames interleaved in declaration order, so every placement
    /// refers to a column that already exists at that point
    fn add_and_rename_columns(&mut self) -> Result<()> {
        for change in self.changes() {
            let added: HashSet<&str> = change.columns_to_add.iter().map(|c| c.key()).collect();
            let renamed_to: HashMap<&str, &ColumnRename> =
                change.columns_to_rename.iter().map(|r| (r.to.key(), r)).collect();

            for column in &change.new.columns {
                let placement = Placement::of(change.new, column);
                if added.contains(column.key()) {
                    self.alter.push_str(&add_column_sql(change.new, column, &placement)?);
                } else if let Some(rename) = renamed_to.get(column.key()) {
                    self.alter
                        .push_str(&rename_column_sql(change.new, rename.from, rename.to, &placement)?);
                }
            }

            let dropped: HashSet<&str> = change.columns_to_drop.iter().map(|c| c.key()).collect();
            let renamed_from: HashMap<&str, &ColumnRename> =
                change.columns_to_rename.iter().map(|r| (r.from.key(), r)).collect();

            for column in &change.old.columns {
                let placement = Placement::of(change.old, column);
                if dropped.contains(column.key()) {
                    self.revert.push_str(&add_column_sql(change.old, column, &placement)?);
                } else if let Some(rename) = renamed_from.get(column.key()) {
                    self.revert
                        .push_str(&rename_column_sql(change.old, rename.to, rename.from, &placement)?);
                }
            }
        }
        Ok(())
    }

    fn update_indexes(&mut self) {
        for change in self.changes() {
            for modify in &change.indexes_to_modify {
                self.alter.push_str(&drop_index_sql(change.new, modify.to));
                self.alter.push_str(&add_index_sql(change.new, modify.to));
                self.revert.push_str(&drop_index_sql(change.old, modify.from));
                self.revert.push_str(&add_index_sql(change.old, modify.from));
            }
            for index in &change.indexes_to_drop {
                self.alter.push_str(&drop_index_sql(change.old, index));
            }
            for index in &change.indexes_to_create {
                self.revert.push_str(&drop_index_sql(change.new, index));
            }
            for index in &change.indexes_to_drop {
                self.revert.push_str(&add_index_sql(change.old, index));
            }
            for index in &change.indexes_to_create {
                self.alter.push_str(&add_index_sql(change.new, index));
            }
        }
    }

    fn update_foreign_keys(&mut self) -> Result<()> {
        for change in self.changes() {
            for column in &change.foreign_keys_to_drop {
                self.alter.push_str(&drop_foreign_key_sql(change.old, column)?);
            }
            for column in &change.foreign_keys_to_create {
                self.revert.push_str(&drop_foreign_key_sql(change.new, column)?);
            }
            for column in &change.foreign_keys_to_drop {
                self.revert.push_str(&add_foreign_key_sql(change.old, column)?);
            }
            for column in &change.foreign_keys_to_create {
                self.alter.push_str(&add_foreign_key_sql(change.new, column)?);
            }
            // the forward script drops these keys together with their columns
            for column in change.columns_to_drop.iter().filter(|c| c.has_reference()) {
                self.revert.push_str(&add_foreign_key_sql(change.old, column)?);
            }
        }
        Ok(())
    }

    fn drop_removed_columns(&mut self) -> Result<()> {
        for change in self.changes() {
            for column in &change.columns_to_drop {
                if column.has_reference() {
                    self.alter.push_str(&drop_foreign_key_sql(change.old, column)?);
                }
                self.alter.push_str(&drop_column_sql(change.old, column));
            }
            for column in &change.columns_to_add {
                self.revert.push_str(&drop_column_sql(change.new, column));
            }
        }
        Ok(())
    }

    fn modify_changed_columns(&mut self) -> Result<()> {
        for change in self.changes() {
            for column in &change.columns_to_alter {
                self.alter.push_str(&modify_column_sql(change.new, column.to, None)?);
                self.revert.push_str(&modify_column_sql(change.old, column.from, None)?);
            }
        }
        Ok(())
    }

    fn reorder_columns(&mut self) -> Result<()> {
        for change in self.changes() {
            for op in &change.moves {
                self.alter.push_str(&move_column_sql(change.new, op)?);
            }
            for op in &change.reverse_moves {
                self.revert.push_str(&move_column_sql(change.old, op)?);
            }
        }
        Ok(())
    }
}

fn move_column_sql(table: &Table, op: &MoveOperation) -> Result<String> {
    let column = table.column(&op.column).ok_or_else(|| {
        Error::Internal(format!("move of unknown column `{}` in `{}`", op.column, table.key()))
    })?;
    modify_column_sql(table, column, Some(&Placement::from(op)))
}
