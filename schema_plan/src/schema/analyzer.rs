//! Database schema analyzer
//!
//! Reads the tables of the connected MySQL database from `information_schema`
//! and turns them into unresolved [`Table`]s.

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use sqlx::{FromRow, MySql, Pool, Row};

use crate::error::Result;
use crate::schema::types::{Column, Index, Schema, Table};
use crate::utils::naming::{lower_snake, quote_identifier};

/// Schema analyzer trait
#[async_trait]
pub trait Analyzer {
    /// Read every base table, skipping the lower-cased names in `ignore_tables`
    async fn analyze_tables(&self, ignore_tables: &[String]) -> Result<Vec<Table>>;

    /// Read and resolve the whole schema
    async fn analyze_schema(&self, ignore_tables: &[String]) -> Result<Schema> {
        Schema::resolve(self.analyze_tables(ignore_tables).await?)
    }
}

#[derive(Debug, FromRow)]
struct TableRow {
    table_name: String,
    engine: Option<String>,
    table_collation: Option<String>,
    table_comment: Option<String>,
}

#[derive(Debug, FromRow)]
struct ColumnRow {
    column_name: String,
    column_type: String,
    is_nullable: String,
    column_key: String,
    column_default: Option<String>,
    collation_name: Option<String>,
    extra: Option<String>,
    column_comment: Option<String>,
}

#[derive(Debug, FromRow)]
struct IndexRow {
    index_name: String,
    non_unique: i64,
    seq_in_index: i64,
    column_name: String,
    index_type: String,
    index_comment: Option<String>,
}

#[derive(Debug, FromRow)]
struct ForeignKeyRow {
    table_name: String,
    column_name: String,
    constraint_name: String,
    referenced_table_name: String,
    referenced_column_name: String,
}

/// MySQL schema analyzer
pub struct MySqlAnalyzer<'a> {
    pool: &'a Pool<MySql>,
}

impl<'a> MySqlAnalyzer<'a> {
    pub fn new(pool: &'a Pool<MySql>) -> Self {
        Self { pool }
    }

    /// Lower-cased index names in creation order, as `SHOW INDEX` lists them
    async fn index_creation_order(&self, table_name: &str) -> Result<IndexSet<String>> {
        let sql = format!("SHOW INDEX FROM {}", quote_identifier(table_name));
        let rows = sqlx::query(&sql).fetch_all(self.pool).await?;

        let mut names = IndexSet::new();
        for row in rows {
            let name: Vec<u8> = row.try_get_unchecked("Key_name")?;
            names.insert(String::from_utf8_lossy(&name).to_lowercase());
        }
        Ok(names)
    }
}

#[async_trait]
impl<'a> Analyzer for MySqlAnalyzer<'a> {
    async fn analyze_tables(&self, ignore_tables: &[String]) -> Result<Vec<Table>> {
        let sql = r#"
            SELECT
                CAST(table_name AS CHAR) AS table_name,
                CAST(engine AS CHAR) AS engine,
                CAST(table_collation AS CHAR) AS table_collation,
                CAST(table_comment AS CHAR) AS table_comment
            FROM information_schema.tables
            WHERE table_schema = DATABASE()
              AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;

        let table_rows = sqlx::query_as::<_, TableRow>(sql)
            .fetch_all(self.pool)
            .await?;

        let mut tables = Vec::with_capacity(table_rows.len());
        for row in table_rows {
            let name = row.table_name.to_lowercase();
            if ignore_tables.iter().any(|t| lower_snake(t) == lower_snake(&name)) {
                tracing::debug!(table = %name, "Skipping ignored table");
                continue;
            }

            let sql = r#"
                SELECT
                    CAST(column_name AS CHAR) AS column_name,
                    CAST(column_type AS CHAR) AS column_type,
                    CAST(is_nullable AS CHAR) AS is_nullable,
                    CAST(column_key AS CHAR) AS column_key,
                    CAST(column_default AS CHAR) AS column_default,
                    CAST(collation_name AS CHAR) AS collation_name,
                    CAST(extra AS CHAR) AS extra,
                    CAST(column_comment AS CHAR) AS column_comment
                FROM information_schema.columns
                WHERE table_schema = DATABASE() AND table_name = ?
                ORDER BY ordinal_position
            "#;

            let column_rows = sqlx::query_as::<_, ColumnRow>(sql)
                .bind(&row.table_name)
                .fetch_all(self.pool)
                .await?;

            let sql = r#"
                SELECT
                    CAST(index_name AS CHAR) AS index_name,
                    CAST(non_unique AS SIGNED) AS non_unique,
                    CAST(seq_in_index AS SIGNED) AS seq_in_index,
                    CAST(column_name AS CHAR) AS column_name,
                    CAST(index_type AS CHAR) AS index_type,
                    CAST(index_comment AS CHAR) AS index_comment
                FROM information_schema.statistics
                WHERE table_schema = DATABASE() AND table_name = ?
                ORDER BY index_name, seq_in_index
            "#;

            let index_rows = sqlx::query_as::<_, IndexRow>(sql)
                .bind(&row.table_name)
                .fetch_all(self.pool)
                .await?;

            let index_order = self.index_creation_order(&row.table_name).await?;
            tables.push(build_table(row, column_rows, index_rows, &index_order));
        }

        let sql = r#"
            SELECT
                CAST(k.table_name AS CHAR) AS table_name,
                CAST(k.column_name AS CHAR) AS column_name,
                CAST(k.constraint_name AS CHAR) AS constraint_name,
                CAST(k.referenced_table_name AS CHAR) AS referenced_table_name,
                CAST(k.referenced_column_name AS CHAR) AS referenced_column_name
            FROM information_schema.key_column_usage k
            JOIN information_schema.table_constraints c
              ON k.table_schema = c.table_schema
             AND k.table_name = c.table_name
             AND k.constraint_name = c.constraint_name
            WHERE c.constraint_type = 'FOREIGN KEY'
              AND k.table_schema = DATABASE()
        "#;

        let fk_rows = sqlx::query_as::<_, ForeignKeyRow>(sql)
            .fetch_all(self.pool)
            .await?;
        apply_foreign_keys(&mut tables, fk_rows);

        tracing::info!(tables = tables.len(), "Loaded tables from database");
        Ok(tables)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Charset part of a collation name, e.g. `utf8mb4` for `utf8mb4_general_ci`
fn charset_of(collation: &str) -> &str {
    collation.split('_').next().unwrap_or(collation)
}

fn is_binary(collation: &str) -> bool {
    collation.rsplit('_').next() == Some("bin")
}

/// Indexes come out in `index_order`; names missing from it keep their
/// first-seen order after the rest
fn build_table(row: TableRow, columns: Vec<ColumnRow>, indexes: Vec<IndexRow>, index_order: &IndexSet<String>) -> Table {
    let collation = non_blank(row.table_collation);
    let mut table = Table {
        name: row.table_name.to_lowercase(),
        engine: non_blank(row.engine),
        default_charset: collation.as_deref().map(|c| charset_of(c).to_string()),
        default_collation: collation,
        comment: non_blank(row.table_comment),
        ..Default::default()
    };

    let mut primary_key = 0;
    for info in columns {
        let mut column = Column::new(&info.column_name.to_lowercase(), &info.column_type);
        column.data_type = merge_collation(&table, &info.column_type, info.collation_name.as_deref());
        column.not_null = info.is_nullable != "YES";
        column.default = info.column_default;
        column.comment = non_blank(info.column_comment);

        if info.column_key == "PRI" {
            primary_key += 1;
            column.primary_key = primary_key;
            column.extra = non_blank(info.extra);
        }
        table.add_column(column);
    }

    let mut groups: IndexMap<String, Vec<IndexRow>> = IndexMap::new();
    for info in indexes {
        if info.index_name == "PRIMARY" {
            continue;
        }
        groups.entry(info.index_name.to_lowercase()).or_default().push(info);
    }
    let rank = |name: &String| index_order.get_index_of(name).unwrap_or(usize::MAX);
    groups.sort_by(|a, _, b, _| rank(a).cmp(&rank(b)));

    for (name, mut rows) in groups {
        rows.sort_by_key(|r| r.seq_in_index);

        let mut index = Index::new(&name, &[]);
        index.column_names = rows.iter().map(|r| r.column_name.to_lowercase()).collect();
        if let Some(first) = rows.first() {
            index.unique = first.non_unique == 0;
            index.index_type = Some(first.index_type.clone()).filter(|t| t != "BTREE");
            index.comment = non_blank(first.index_comment.clone());
        }
        table.add_index(index);
    }

    table
}

/// Column type with its collation folded in when it differs from the table's
fn merge_collation(table: &Table, column_type: &str, collation: Option<&str>) -> String {
    let Some(collation) = collation.filter(|c| !c.is_empty()) else {
        return column_type.to_string();
    };
    let charset = charset_of(collation);

    if table.default_charset.as_deref() != Some(charset) {
        format!("{} CHARACTER SET {} COLLATE {}", column_type, charset, collation)
    } else if table.default_collation.as_deref() != Some(collation) {
        if is_binary(collation) && !table.is_binary_collation() {
            format!("{} binary", column_type)
        } else {
            format!("{} COLLATE {}", column_type, collation)
        }
    } else {
        column_type.to_string()
    }
}

/// Set each referencing column's `Reference` and drop the implicit index
/// MySQL creates under the constraint's name
fn apply_foreign_keys(tables: &mut [Table], rows: Vec<ForeignKeyRow>) {
    for row in rows {
        let table_name = row.table_name.to_lowercase();
        let column_name = row.column_name.to_lowercase();
        let Some(table) = tables.iter_mut().find(|t| t.name == table_name) else {
            continue;
        };
        let Some(column) = table.columns.iter_mut().find(|c| c.name == column_name) else {
            continue;
        };

        column.reference = Some(format!(
            "{}.{}",
            row.referenced_table_name.to_lowercase(),
            row.referenced_column_name.to_lowercase()
        ));

        let constraint = row.constraint_name.to_lowercase();
        table
            .indexes
            .retain(|i| !(i.name == constraint && i.contains_column_name(&column_name)));
    }
}
