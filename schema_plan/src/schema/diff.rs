//! Schema difference calculator
//!
//! This module compares two resolved schemas and classifies every table,
//! column, index, foreign key and column-order change between them.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::schema::generator::index_definition;
use crate::schema::normalize::{is_same_type, normalize_default};
use crate::schema::types::{Column, Index, Schema, Table};

/// The first attribute category in which two column definitions differ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnChangeKind {
    Same,
    Type,
    Comment,
    NotNull,
    Default,
    Extra,
}

impl Column {
    /// Compare this definition against `other`, checking type, comment,
    /// not-null, default and extra in that order. Names are not compared.
    pub fn change_kind(&self, other: &Column) -> Result<ColumnChangeKind> {
        if !is_same_type(&self.data_type, &other.data_type) {
            return Ok(ColumnChangeKind::Type);
        }
        if self.comment != other.comment {
            return Ok(ColumnChangeKind::Comment);
        }
        if self.not_null != other.not_null {
            return Ok(ColumnChangeKind::NotNull);
        }
        if normalize_default(self)? != normalize_default(other)? {
            return Ok(ColumnChangeKind::Default);
        }
        if self.extra != other.extra {
            return Ok(ColumnChangeKind::Extra);
        }
        Ok(ColumnChangeKind::Same)
    }
}

/// Options controlling what the differ compares
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Compare column references and emit foreign key constraints
    pub foreign_key: bool,
}

/// Represents changes needed to turn one schema into another
#[derive(Debug, Clone)]
pub struct SchemaDiff<'a> {
    pub old: &'a Schema,
    pub new: &'a Schema,
    pub foreign_key: bool,
    pub tables_to_create: Vec<&'a Table>,
    pub tables_to_drop: Vec<&'a Table>,
    pub table_changes: Vec<TableDiff<'a>>,
}

/// Changes within a table present in both schemas
#[derive(Debug, Clone)]
pub struct TableDiff<'a> {
    pub old: &'a Table,
    pub new: &'a Table,
    pub attributes_changed: bool,
    pub columns_to_add: Vec<&'a Column>,
    pub columns_to_drop: Vec<&'a Column>,
    pub columns_to_rename: Vec<ColumnRename<'a>>,
    pub columns_to_alter: Vec<ColumnChange<'a>>,
    pub indexes_to_create: Vec<&'a Index>,
    pub indexes_to_drop: Vec<&'a Index>,
    pub indexes_to_modify: Vec<IndexChange<'a>>,
    /// New-side columns whose foreign key has to be created
    pub foreign_keys_to_create: Vec<&'a Column>,
    /// Old-side columns whose foreign key has to be dropped
    pub foreign_keys_to_drop: Vec<&'a Column>,
    /// Moves that turn the old column order into the new one
    pub moves: Vec<MoveOperation>,
    /// Moves that turn the new column order back into the old one
    pub reverse_moves: Vec<MoveOperation>,
}

/// A column whose definition changed under the same name
#[derive(Debug, Clone)]
pub struct ColumnChange<'a> {
    pub column_name: String,
    pub kind: ColumnChangeKind,
    pub from: &'a Column,
    pub to: &'a Column,
}

/// A column detected as renamed: same definition, different name
#[derive(Debug, Clone)]
pub struct ColumnRename<'a> {
    pub from: &'a Column,
    pub to: &'a Column,
}

/// An index whose definition changed under the same name
#[derive(Debug, Clone)]
pub struct IndexChange<'a> {
    pub from: &'a Index,
    pub to: &'a Index,
}

/// Reposition `column` right after `after`, or first when `after` is `None`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOperation {
    pub column: String,
    pub after: Option<String>,
}

impl<'a> SchemaDiff<'a> {
    /// Generate a schema diff from `old` to `new`
    pub fn generate(old: &'a Schema, new: &'a Schema, options: &DiffOptions) -> Result<Self> {
        let tables_to_create: Vec<&Table> = new
            .tables()
            .iter()
            .filter(|t| old.table(t.key()).is_none())
            .collect();

        let tables_to_drop: Vec<&Table> = old
            .tables()
            .iter()
            .filter(|t| new.table(t.key()).is_none())
            .collect();

        for table in &tables_to_drop {
            for edge in old.references_to(table) {
                let referrer = &old.tables()[edge.from.table];
                if new.table(referrer.key()).is_some() && referrer.key() != table.key() {
                    tracing::warn!(
                        table = %table.key(),
                        referenced_by = %referrer.key(),
                        "Dropping a table that is still referenced"
                    );
                }
            }
        }

        let mut table_changes = Vec::new();
        for new_table in new.tables() {
            let Some(old_table) = old.table(new_table.key()) else {
                continue;
            };
            let table_diff = TableDiff::generate(old_table, new_table, options)?;
            if !table_diff.is_empty() {
                table_changes.push(table_diff);
            }
        }

        tracing::info!(
            create = tables_to_create.len(),
            drop = tables_to_drop.len(),
            alter = table_changes.len(),
            "Computed schema diff"
        );

        Ok(Self {
            old,
            new,
            foreign_key: options.foreign_key,
            tables_to_create,
            tables_to_drop,
            table_changes,
        })
    }

    /// Check if the diff is empty (no changes needed)
    pub fn is_empty(&self) -> bool {
        self.tables_to_create.is_empty()
            && self.tables_to_drop.is_empty()
            && self.table_changes.is_empty()
    }
}

impl<'a> TableDiff<'a> {
    /// Compare two versions of the same table
    pub fn generate(old: &'a Table, new: &'a Table, options: &DiffOptions) -> Result<Self> {
        let (columns_to_add, columns_to_drop, columns_to_rename) = diff_column_presence(old, new)?;

        let mut columns_to_alter = Vec::new();
        for new_column in &new.columns {
            let Some(old_column) = old.column(new_column.key()) else {
                continue;
            };
            let kind = old_column.change_kind(new_column)?;
            if kind != ColumnChangeKind::Same {
                tracing::debug!(table = %new.key(), column = %new_column.key(), ?kind, "Column changed");
                columns_to_alter.push(ColumnChange {
                    column_name: new_column.key().to_string(),
                    kind,
                    from: old_column,
                    to: new_column,
                });
            }
        }

        let (indexes_to_create, indexes_to_drop, indexes_to_modify) = diff_indexes(old, new);

        let (foreign_keys_to_create, foreign_keys_to_drop) = if options.foreign_key {
            diff_references(old, new, &columns_to_add)
        } else {
            (Vec::new(), Vec::new())
        };

        let moves = move_operations(new, old)?;
        let reverse_moves = move_operations(old, new)?;

        Ok(Self {
            old,
            new,
            attributes_changed: old.has_attribute_change(new),
            columns_to_add,
            columns_to_drop,
            columns_to_rename,
            columns_to_alter,
            indexes_to_create,
            indexes_to_drop,
            indexes_to_modify,
            foreign_keys_to_create,
            foreign_keys_to_drop,
            moves,
            reverse_moves,
        })
    }

    pub fn is_empty(&self) -> bool {
        !self.attributes_changed
            && self.columns_to_add.is_empty()
            && self.columns_to_drop.is_empty()
            && self.columns_to_rename.is_empty()
            && self.columns_to_alter.is_empty()
            && self.indexes_to_create.is_empty()
            && self.indexes_to_drop.is_empty()
            && self.indexes_to_modify.is_empty()
            && self.foreign_keys_to_create.is_empty()
            && self.foreign_keys_to_drop.is_empty()
            && self.moves.is_empty()
    }
}

type ColumnPresence<'a> = (Vec<&'a Column>, Vec<&'a Column>, Vec<ColumnRename<'a>>);

/// Split name-level column differences into adds, drops and renames.
///
/// Each new-only column, in new declaration order, is paired with the first
/// unpaired old-only column (old declaration order) whose definition is
/// identical apart from the name.
fn diff_column_presence<'a>(old: &'a Table, new: &'a Table) -> Result<ColumnPresence<'a>> {
    let missing_in_old: Vec<&Column> = new
        .columns
        .iter()
        .filter(|c| old.column(c.key()).is_none())
        .collect();
    let missing_in_new: Vec<&Column> = old
        .columns
        .iter()
        .filter(|c| new.column(c.key()).is_none())
        .collect();

    let mut paired: HashSet<&str> = HashSet::new();
    let mut adds = Vec::new();
    let mut renames = Vec::new();

    for &candidate in &missing_in_old {
        let mut similar = None;
        for &old_column in &missing_in_new {
            if paired.contains(old_column.key()) {
                continue;
            }
            if old_column.change_kind(candidate)? == ColumnChangeKind::Same {
                similar = Some(old_column);
                break;
            }
        }

        match similar {
            Some(old_column) => {
                tracing::debug!(
                    table = %new.key(),
                    from = %old_column.key(),
                    to = %candidate.key(),
                    "Column rename detected"
                );
                paired.insert(old_column.key());
                renames.push(ColumnRename {
                    from: old_column,
                    to: candidate,
                });
            }
            None => adds.push(candidate),
        }
    }

    let drops = missing_in_new
        .into_iter()
        .filter(|c| !paired.contains(c.key()))
        .collect();

    Ok((adds, drops, renames))
}

type IndexPresence<'a> = (Vec<&'a Index>, Vec<&'a Index>, Vec<IndexChange<'a>>);

/// Compare indexes by their full definition text.
///
/// A changed definition under an existing name is a modify, never an
/// unrelated add plus drop.
fn diff_indexes<'a>(old: &'a Table, new: &'a Table) -> IndexPresence<'a> {
    let old_definitions: HashSet<String> = old.indexes.iter().map(|i| index_definition(old, i)).collect();
    let new_definitions: HashSet<String> = new.indexes.iter().map(|i| index_definition(new, i)).collect();

    let mut creates = Vec::new();
    let mut modifies = Vec::new();
    for index in &new.indexes {
        if old_definitions.contains(&index_definition(new, index)) {
            continue;
        }
        match old.index(&index.name) {
            Some(previous) => modifies.push(IndexChange {
                from: previous,
                to: index,
            }),
            None => creates.push(index),
        }
    }

    let drops = old
        .indexes
        .iter()
        .filter(|i| !new_definitions.contains(&index_definition(old, i)) && new.index(&i.name).is_none())
        .collect();

    (creates, drops, modifies)
}

/// Foreign key changes for columns present under the same name on both sides,
/// plus keys carried by newly added columns
fn diff_references<'a>(
    old: &'a Table,
    new: &'a Table,
    columns_to_add: &[&'a Column],
) -> (Vec<&'a Column>, Vec<&'a Column>) {
    let mut creates: Vec<&Column> = new
        .columns
        .iter()
        .filter(|c| c.has_reference())
        .filter(|c| old.column(c.key()).map_or(false, |o| o.reference != c.reference))
        .collect();
    creates.extend(columns_to_add.iter().copied().filter(|c| c.has_reference()));
    creates.sort_by_key(|c| c.position());

    let drops = old
        .columns
        .iter()
        .filter(|c| c.has_reference())
        .filter(|c| new.column(c.key()).map_or(false, |n| n.reference != c.reference))
        .collect();

    (creates, drops)
}

/// Moves that reorder `current` into the column order of `target`.
///
/// The working list starts from `current`'s order with `target`-only columns
/// inserted after their target predecessor and `current`-only columns
/// removed, which is the state after columns are added, renamed and dropped.
pub fn move_operations(target: &Table, current: &Table) -> Result<Vec<MoveOperation>> {
    let to = target.column_names();
    let mut working = current.column_names();

    for (i, &name) in to.iter().enumerate() {
        if current.column(name).is_some() {
            continue;
        }
        let at = match i {
            0 => 0,
            _ => position_of(&working, to[i - 1])? + 1,
        };
        working.insert(at, name);
    }
    working.retain(|name| target.column(name).is_some());

    reorder(&to, working)
}

fn position_of(list: &[&str], name: &str) -> Result<usize> {
    list.iter()
        .position(|&n| n == name)
        .ok_or_else(|| Error::Internal(format!("column `{}` missing from working order", name)))
}

/// Move every column outside the longest run already in target order to
/// sit after its target predecessor, walking the target order.
///
/// A moved column's predecessor is either kept or was placed earlier, so
/// each move is final and the count is at most `to.len()`.
fn reorder<'a>(to: &[&'a str], mut working: Vec<&'a str>) -> Result<Vec<MoveOperation>> {
    let ranks = working
        .iter()
        .map(|&name| position_of(to, name))
        .collect::<Result<Vec<_>>>()?;
    let kept: HashSet<&str> = longest_increasing_run(&ranks)
        .into_iter()
        .map(|i| working[i])
        .collect();

    let mut moves = Vec::new();
    for (k, &name) in to.iter().enumerate() {
        if kept.contains(name) {
            continue;
        }
        let after = if k == 0 { None } else { Some(to[k - 1]) };
        let i = position_of(&working, name)?;
        let current_prev = if i == 0 { None } else { Some(working[i - 1]) };
        if current_prev == after {
            continue;
        }

        working.remove(i);
        let at = match after {
            Some(prev) => position_of(&working, prev)? + 1,
            None => 0,
        };
        working.insert(at, name);
        moves.push(MoveOperation {
            column: name.to_string(),
            after: after.map(str::to_string),
        });
    }

    if working != to {
        return Err(Error::Internal(format!(
            "column reorder ended out of order: {:?} -> {:?}",
            working, to
        )));
    }
    Ok(moves)
}

/// Indices of a longest strictly increasing subsequence of `ranks`
fn longest_increasing_run(ranks: &[usize]) -> Vec<usize> {
    let mut length = vec![1usize; ranks.len()];
    let mut prev: Vec<Option<usize>> = vec![None; ranks.len()];
    for i in 0..ranks.len() {
        for j in 0..i {
            if ranks[j] < ranks[i] && length[j] + 1 > length[i] {
                length[i] = length[j] + 1;
                prev[i] = Some(j);
            }
        }
    }

    let mut run = Vec::new();
    let mut cursor = (0..ranks.len()).max_by_key(|&i| (length[i], std::cmp::Reverse(i)));
    while let Some(i) = cursor {
        run.push(i);
        cursor = prev[i];
    }
    run.reverse();
    run
}
