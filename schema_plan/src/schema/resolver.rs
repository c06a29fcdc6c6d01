//! Schema resolution
//!
//! Turns freshly loaded tables into a [`Schema`]: tables are sorted, column
//! order chains and primary keys are derived, index columns and foreign key
//! references are linked. Any dangling name fails the whole load.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::schema::types::{ColumnId, ForeignKeyEdge, Schema, Table};
use crate::utils::naming::{find_duplicate, lower_snake};

impl Schema {
    /// Resolve a set of tables into a schema snapshot
    pub fn resolve(mut tables: Vec<Table>) -> Result<Self> {
        for table in &mut tables {
            table.key = lower_snake(&table.name);
        }
        tables.sort_by(|a, b| a.key.cmp(&b.key));

        if let Some((first, second)) = find_duplicate(tables.iter().map(|t| t.name.as_str())) {
            return Err(Error::DuplicateName {
                kind: "table",
                name: second,
                context: format!("conflicts with table `{}`", first),
            });
        }

        let mut lookup = HashMap::with_capacity(tables.len());
        for (id, table) in tables.iter_mut().enumerate() {
            resolve_table(id, table)?;
            lookup.insert(table.key.clone(), id);
        }

        let mut schema = Schema {
            tables,
            lookup,
            references: Vec::new(),
        };
        schema.resolve_references()?;

        tracing::debug!(
            tables = schema.tables.len(),
            references = schema.references.len(),
            "Resolved schema"
        );
        Ok(schema)
    }

    fn resolve_references(&mut self) -> Result<()> {
        let mut edges = Vec::new();

        for (table_id, table) in self.tables.iter().enumerate() {
            for (column_id, column) in table.columns.iter().enumerate() {
                let Some((ref_table, ref_column)) = column.reference_target(&table.key)? else {
                    continue;
                };

                let target = self
                    .lookup
                    .get(&lower_snake(&ref_table))
                    .and_then(|&t| {
                        self.tables[t]
                            .column_lookup
                            .get(&lower_snake(&ref_column))
                            .map(|&c| ColumnId { table: t, column: c })
                    })
                    .ok_or_else(|| Error::NotFound {
                        kind: "referenced column",
                        name: format!("{}.{}", ref_table, ref_column),
                        context: format!("table:{}, column:{}", table.key, column.key),
                    })?;

                edges.push(ForeignKeyEdge {
                    from: ColumnId {
                        table: table_id,
                        column: column_id,
                    },
                    to: target,
                });
            }
        }

        for (edge_id, edge) in edges.iter().enumerate() {
            self.tables[edge.from.table].references.push(edge_id);
            self.tables[edge.from.table].columns[edge.from.column]
                .references
                .push(edge_id);
            self.tables[edge.to.table].inverse_references.push(edge_id);
            self.tables[edge.to.table].columns[edge.to.column]
                .inverse_references
                .push(edge_id);
        }
        self.references = edges;

        Ok(())
    }
}

fn none_if_blank(value: &mut Option<String>) {
    if value.as_deref().map_or(false, |v| v.trim().is_empty()) {
        *value = None;
    }
}

fn resolve_table(id: usize, table: &mut Table) -> Result<()> {
    none_if_blank(&mut table.engine);
    none_if_blank(&mut table.default_charset);
    none_if_blank(&mut table.default_collation);
    none_if_blank(&mut table.comment);

    if let Some((first, second)) = find_duplicate(table.columns.iter().map(|c| c.name.as_str())) {
        return Err(Error::DuplicateName {
            kind: "column",
            name: second,
            context: format!("table:{}, conflicts with `{}`", table.key, first),
        });
    }

    table.column_lookup.clear();
    table.references.clear();
    table.inverse_references.clear();

    let mut previous = None;
    for (position, column) in table.columns.iter_mut().enumerate() {
        column.key = lower_snake(&column.name);
        column.table = id;
        column.position = position;
        column.previous = previous;
        previous = Some(position);

        column.extra = column
            .extra
            .take()
            .map(|e| e.trim().to_uppercase())
            .filter(|e| !e.is_empty());
        column.reference = column
            .reference
            .take()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        none_if_blank(&mut column.comment);

        column.indexes.clear();
        column.references.clear();
        column.inverse_references.clear();

        table.column_lookup.insert(column.key.clone(), position);
    }

    table.primary_keys = collect_primary_keys(table);

    table.index_lookup.clear();
    for (index_id, index) in table.indexes.iter_mut().enumerate() {
        if table.index_lookup.insert(index.name.clone(), index_id).is_some() {
            return Err(Error::DuplicateName {
                kind: "index",
                name: index.name.clone(),
                context: format!("table:{}", table.key),
            });
        }
        none_if_blank(&mut index.index_type);
        none_if_blank(&mut index.comment);

        index.columns.clear();
        for name in &index.column_names {
            let position = table
                .column_lookup
                .get(&lower_snake(name))
                .copied()
                .ok_or_else(|| Error::NotFound {
                    kind: "column",
                    name: name.clone(),
                    context: format!(
                        "table:{}, index:{}, columns:{:?}",
                        table.key, index.name, index.column_names
                    ),
                })?;
            index.columns.push(position);
            table.columns[position].indexes.push(index_id);
        }
    }

    Ok(())
}

/// Collect primary key columns by ordinal, starting at 1.
///
/// Collection stops at the first missing ordinal, so members past a gap are
/// left out of the key.
// TODO: decide whether an ordinal gap should become a load error instead of a warning
fn collect_primary_keys(table: &Table) -> Vec<usize> {
    let mut keys = Vec::new();
    let mut ordinal = 1;
    while let Some(position) = table.columns.iter().position(|c| c.primary_key == ordinal) {
        keys.push(position);
        ordinal += 1;
    }

    let declared = table.columns.iter().filter(|c| c.primary_key > 0).count();
    if declared > keys.len() {
        tracing::warn!(
            table = %table.key,
            declared,
            collected = keys.len(),
            "Primary key ordinals have a gap; trailing members are not part of the key"
        );
    }

    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::types::{Column, Index};

    fn user_table() -> Table {
        let mut table = Table::new("User");
        table.add_column(Column::new("id", "int").not_null().primary_key(1).extra("auto_increment"));
        table.add_column(Column::new("name", "varchar(64)").not_null());
        table.add_column(Column::new("email", "varchar(255)"));
        table.add_index(Index::new("email_idx", &["email"]).unique());
        table
    }

    fn post_table() -> Table {
        let mut table = Table::new("post");
        table.add_column(Column::new("id", "int").not_null().primary_key(1));
        table.add_column(Column::new("user_id", "int").not_null().reference("user.id"));
        table
    }

    #[test]
    fn test_tables_sorted_and_found_case_insensitively() {
        let schema = Schema::resolve(vec![user_table(), post_table()]).unwrap();

        let names: Vec<&str> = schema.tables().iter().map(|t| t.key()).collect();
        assert_eq!(names, vec!["post", "user"]);
        assert_eq!(schema.table("USER").unwrap().name, "User");
    }

    #[test]
    fn test_order_chain_and_extra() {
        let schema = Schema::resolve(vec![user_table()]).unwrap();
        let table = schema.table("user").unwrap();

        let id = table.column("id").unwrap();
        let name = table.column("name").unwrap();
        let email = table.column("email").unwrap();

        assert!(table.predecessor(id).is_none());
        assert_eq!(table.predecessor(name).unwrap().key(), "id");
        assert_eq!(table.predecessor(email).unwrap().key(), "name");
        assert_eq!(id.extra.as_deref(), Some("AUTO_INCREMENT"));
        assert_eq!(schema.table_of(email).key(), "user");
    }

    #[test]
    fn test_index_columns_resolved() {
        let schema = Schema::resolve(vec![user_table()]).unwrap();
        let table = schema.table("user").unwrap();
        let index = table.index("email_idx").unwrap();

        let columns: Vec<&str> = table.index_columns(index).map(|c| c.key()).collect();
        assert_eq!(columns, vec!["email"]);
        assert_eq!(table.column("email").unwrap().index_ids(), &[0]);
    }

    #[test]
    fn test_unknown_index_column_is_not_found() {
        let mut table = user_table();
        table.add_index(Index::new("missing_idx", &["nickname"]));

        let err = Schema::resolve(vec![table]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_references_linked_both_ways() {
        let schema = Schema::resolve(vec![user_table(), post_table()]).unwrap();
        let post = schema.table("post").unwrap();
        let user = schema.table("user").unwrap();

        let edge = schema.references_from(post).next().unwrap();
        assert_eq!(schema.column(edge.from).key(), "user_id");
        assert_eq!(schema.column(edge.to).key(), "id");
        assert_eq!(schema.references_to(user).count(), 1);
        assert_eq!(schema.references().len(), 1);
    }

    #[test]
    fn test_dangling_reference_is_not_found() {
        let err = Schema::resolve(vec![post_table()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_malformed_reference() {
        let mut table = post_table();
        table.columns[1].reference = Some("user".to_string());

        let err = Schema::resolve(vec![user_table(), table]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedReference);
    }

    #[test]
    fn test_duplicate_names() {
        let err = Schema::resolve(vec![user_table(), Table::new("user")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateName);

        let mut table = user_table();
        table.add_column(Column::new("Email", "text"));
        let err = Schema::resolve(vec![table]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateName);
    }

    #[test]
    fn test_primary_key_gap_stops_collection() {
        let mut table = Table::new("pair");
        table.add_column(Column::new("a", "int").primary_key(1));
        table.add_column(Column::new("b", "int").primary_key(3));
        table.add_column(Column::new("c", "int").primary_key(2));
        table.add_column(Column::new("d", "int").primary_key(5));

        let schema = Schema::resolve(vec![table]).unwrap();
        let keys: Vec<&str> = schema.table("pair").unwrap().primary_keys().map(|c| c.key()).collect();
        assert_eq!(keys, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_blank_attributes_become_absent() {
        let mut table = Table::new("t").comment("").engine("InnoDB");
        table.add_column(Column::new("a", "varchar(8)").default("").comment(" "));

        let schema = Schema::resolve(vec![table]).unwrap();
        let table = schema.table("t").unwrap();
        assert!(table.comment.is_none());
        assert_eq!(table.engine.as_deref(), Some("InnoDB"));

        let column = table.column("a").unwrap();
        assert!(column.comment.is_none());
        assert_eq!(column.default.as_deref(), Some(""));
    }
}
