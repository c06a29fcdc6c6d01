//! Type definitions for schema snapshot objects
//!
//! Tables own their columns and indexes. Every cross reference (column to
//! table, index to column, foreign key edges) is an integer handle into the
//! owning [`Schema`], filled in by the resolver.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::utils::naming::lower_snake;

/// Handle to a column inside a resolved [`Schema`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnId {
    pub table: usize,
    pub column: usize,
}

/// A foreign key derived from a column's `Reference`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeyEdge {
    pub from: ColumnId,
    pub to: ColumnId,
}

/// A resolved schema snapshot.
///
/// Tables are sorted by their lower-snake name. The only way to obtain a
/// populated `Schema` is [`Schema::resolve`], so every index column and every
/// reference inside it is known to exist.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub(crate) tables: Vec<Table>,
    pub(crate) lookup: HashMap<String, usize>,
    pub(crate) references: Vec<ForeignKeyEdge>,
}

impl Schema {
    /// A schema with no tables, used as the "old" side of a first migration
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Look up a table by name, case-insensitively
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.lookup.get(&lower_snake(name)).map(|&id| &self.tables[id])
    }

    pub fn column(&self, id: ColumnId) -> &Column {
        &self.tables[id.table].columns[id.column]
    }

    /// The table a resolved column belongs to
    pub fn table_of(&self, column: &Column) -> &Table {
        &self.tables[column.table]
    }

    pub fn references(&self) -> &[ForeignKeyEdge] {
        &self.references
    }

    /// Foreign keys declared by columns of `table`
    pub fn references_from<'a>(&'a self, table: &'a Table) -> impl Iterator<Item = &'a ForeignKeyEdge> + 'a {
        table.references.iter().map(move |&edge| &self.references[edge])
    }

    /// Foreign keys in other tables (or this one) that point at `table`
    pub fn references_to<'a>(&'a self, table: &'a Table) -> impl Iterator<Item = &'a ForeignKeyEdge> + 'a {
        table.inverse_references.iter().map(move |&edge| &self.references[edge])
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// Represents a database table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Table {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_charset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_collation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub indexes: Vec<Index>,

    #[serde(skip)]
    pub(crate) key: String,
    #[serde(skip)]
    pub(crate) primary_keys: Vec<usize>,
    #[serde(skip)]
    pub(crate) column_lookup: HashMap<String, usize>,
    #[serde(skip)]
    pub(crate) index_lookup: HashMap<String, usize>,
    #[serde(skip)]
    pub(crate) references: Vec<usize>,
    #[serde(skip)]
    pub(crate) inverse_references: Vec<usize>,
}

impl Table {
    /// Create a new table with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn engine(mut self, engine: &str) -> Self {
        self.engine = Some(engine.to_string());
        self
    }

    pub fn charset(mut self, charset: &str) -> Self {
        self.default_charset = Some(charset.to_string());
        self
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    /// Add a column to the table
    pub fn add_column(&mut self, column: Column) {
        self.columns.push(column);
    }

    /// Add an index to the table
    pub fn add_index(&mut self, index: Index) {
        self.indexes.push(index);
    }

    /// Lower-snake identity used for comparison and in emitted SQL
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Look up a column by name, case-insensitively
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_lookup.get(&lower_snake(name)).map(|&i| &self.columns[i])
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.index_lookup.get(name).map(|&i| &self.indexes[i])
    }

    /// Lower-snake column names in declaration order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.key()).collect()
    }

    /// Primary key columns in ordinal order
    pub fn primary_keys(&self) -> impl Iterator<Item = &Column> {
        self.primary_keys.iter().map(move |&i| &self.columns[i])
    }

    /// The column immediately before `column` in declaration order
    pub fn predecessor(&self, column: &Column) -> Option<&Column> {
        column.previous.map(|i| &self.columns[i])
    }

    /// Columns an index covers, in key order
    pub fn index_columns<'a>(&'a self, index: &'a Index) -> impl Iterator<Item = &'a Column> + 'a {
        index.columns.iter().map(move |&i| &self.columns[i])
    }

    /// Engine, comment and default charset are compared as one unit
    pub fn has_attribute_change(&self, other: &Table) -> bool {
        self.engine != other.engine
            || self.comment != other.comment
            || self.default_charset != other.default_charset
    }

    pub fn is_binary_collation(&self) -> bool {
        self.default_collation
            .as_deref()
            .map_or(false, |c| c.rsplit('_').next() == Some("bin"))
    }
}

/// Represents a table column
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Column {
    pub name: String,
    #[serde(rename = "Type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub not_null: bool,
    /// 1-based position in the primary key; 0 when not part of it
    #[serde(default, skip_serializing_if = "is_zero")]
    pub primary_key: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
    /// Foreign key target as `table.column`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(skip)]
    pub(crate) key: String,
    #[serde(skip)]
    pub(crate) table: usize,
    #[serde(skip)]
    pub(crate) position: usize,
    #[serde(skip)]
    pub(crate) previous: Option<usize>,
    #[serde(skip)]
    pub(crate) indexes: Vec<usize>,
    #[serde(skip)]
    pub(crate) references: Vec<usize>,
    #[serde(skip)]
    pub(crate) inverse_references: Vec<usize>,
}

impl Column {
    /// Create a new column with the given name and type
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            ..Default::default()
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn primary_key(mut self, ordinal: u32) -> Self {
        self.primary_key = ordinal;
        self
    }

    /// Set a default value for the column
    pub fn default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }

    pub fn extra(mut self, extra: &str) -> Self {
        self.extra = Some(extra.to_string());
        self
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub fn reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Zero-based declaration position within the owning table
    pub fn position(&self) -> usize {
        self.position
    }

    /// Handles of the indexes covering this column, within the owning table
    pub fn index_ids(&self) -> &[usize] {
        &self.indexes
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Split `Reference` into its `(table, column)` parts
    pub fn reference_target(&self, table_name: &str) -> Result<Option<(String, String)>> {
        let Some(reference) = &self.reference else {
            return Ok(None);
        };
        let parts: Vec<&str> = reference.split('.').collect();
        if parts.len() != 2 || parts.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::MalformedReference {
                table: table_name.to_string(),
                column: self.name.clone(),
                reference: reference.clone(),
            });
        }
        Ok(Some((parts[0].trim().to_string(), parts[1].trim().to_string())))
    }
}

/// Represents an index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Index {
    pub name: String,
    pub column_names: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub index_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(skip)]
    pub(crate) columns: Vec<usize>,
}

impl Index {
    pub fn new(name: &str, column_names: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            column_names: column_names.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn contains_column_name(&self, name: &str) -> bool {
        let name = lower_snake(name);
        self.column_names.iter().any(|c| lower_snake(c) == name)
    }
}
