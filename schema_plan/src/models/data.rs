//! Table data
//!
//! Row data moves between JSON documents, data workbooks and live databases,
//! and is rendered as a TRUNCATE + INSERT script. Every input kind yields the
//! same [`Data`] shape:
//!
//! ```json
//! {"Tables": [{"Name": "users", "Keys": ["id", "name"], "Values": [["1", "alice"]]}]}
//! ```

use rust_xlsxwriter::Workbook;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::config::DatabaseConfig;
use crate::db::connection::{is_dsn, DatabaseConnection};
use crate::db::executor::SqlExecutor;
use crate::error::{Error, Result};
use crate::models::excel::{self, header_format, Cell, Sheet, SheetWriter};
use crate::models::loader::InputFormat;
use crate::schema::types::Schema;
use crate::utils::naming::{lower_snake, quote_identifier};

const LIST_TABLES: &str = "SELECT table_name FROM information_schema.tables \
     WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name;";

/// Rows of every table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Data {
    #[serde(default)]
    pub tables: Vec<TableData>,
}

/// Rows of one table; each row holds one value per key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableData {
    pub name: String,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

/// Which tables to take: every table named in `tables` (all when empty),
/// minus `ignore_tables`. Names compare in lower snake case.
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    pub tables: Vec<String>,
    pub ignore_tables: Vec<String>,
}

impl TableFilter {
    pub fn accepts(&self, name: &str) -> bool {
        let key = lower_snake(name);
        let wanted = self.tables.is_empty() || self.tables.iter().any(|t| lower_snake(t) == key);
        wanted && !self.ignore_tables.iter().any(|t| lower_snake(t) == key)
    }
}

/// Output formats understood by `data`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Sql,
    Json,
    Xlsx,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Sql => "sql",
            DataFormat::Json => "json",
            DataFormat::Xlsx => "xlsx",
        }
    }

    /// An explicit format wins, then the output extension, then `sql`
    pub fn detect(format: Option<&str>, output: Option<&Path>) -> Result<Self> {
        if let Some(format) = format {
            return format.parse();
        }
        Ok(output
            .and_then(|path| path.extension())
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
            .unwrap_or(DataFormat::Sql))
    }
}

impl FromStr for DataFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sql" => Ok(DataFormat::Sql),
            "json" => Ok(DataFormat::Json),
            "xlsx" => Ok(DataFormat::Xlsx),
            other => Err(Error::InvalidInput(format!(
                "data format must be one of [sql, json, xlsx]: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Data {
    /// Add a table's rows, appending to an earlier table of the same name
    pub fn merge(&mut self, table: TableData) -> Result<()> {
        let Some(existing) = self.tables.iter_mut().find(|t| t.name == table.name) else {
            self.tables.push(table);
            return Ok(());
        };
        if existing.keys != table.keys {
            return Err(Error::InvalidInput(format!(
                "table `{}` appears twice with different keys: {:?} and {:?}",
                table.name, existing.keys, table.keys
            )));
        }
        existing.values.extend(table.values);
        Ok(())
    }

    /// Render as a SQL script. Tables without rows are left out.
    ///
    /// `defines` supplies column defaults for empty values; without it an
    /// empty value stays `''`.
    pub fn to_sql(&self, defines: Option<&Schema>, truncate: bool) -> String {
        let mut out = String::new();
        for table in self.tables.iter().filter(|t| !t.values.is_empty()) {
            let name = quote_identifier(&table.name);
            if truncate {
                out.push_str(&format!("TRUNCATE {};\n", name));
            }

            let keys: Vec<String> = table.keys.iter().map(|k| quote_identifier(k)).collect();
            out.push_str(&format!("INSERT INTO {} ({})\nVALUES\n", name, keys.join(", ")));

            let rows: Vec<String> = table
                .values
                .iter()
                .map(|row| {
                    let values: Vec<String> = row
                        .iter()
                        .enumerate()
                        .map(|(i, value)| sql_value(value, default_for(defines, table, i)))
                        .collect();
                    format!("({})", values.join(","))
                })
                .collect();
            out.push_str(&rows.join(",\n"));
            out.push_str(";\n\n");
        }
        out
    }

    /// Serialize as a JSON document or a data workbook
    pub fn marshal(&self, format: DataFormat, defines: Option<&Schema>, truncate: bool) -> Result<Vec<u8>> {
        match format {
            DataFormat::Sql => Ok(self.to_sql(defines, truncate).into_bytes()),
            DataFormat::Json => Ok(serde_json::to_vec_pretty(self)?),
            DataFormat::Xlsx => self.to_workbook(),
        }
    }

    /// One sheet per table: keys on a header row, then one row per record
    pub fn to_workbook(&self) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let header = header_format();

        for table in &self.tables {
            let sheet = workbook.add_worksheet();
            sheet.set_name(table.name.as_str())?;
            let mut writer = SheetWriter::new(sheet, &header);

            let keys: Vec<&str> = table.keys.iter().map(String::as_str).collect();
            writer.header_row(&keys)?;
            for row in &table.values {
                let cells: Vec<Cell> = row.iter().map(value_cell).collect();
                writer.values_row(0, &cells)?;
            }
        }

        Ok(workbook.save_to_buffer()?)
    }
}

fn default_for<'a>(defines: Option<&'a Schema>, table: &TableData, i: usize) -> Option<&'a str> {
    let column = defines?.table(&table.name)?.column(table.keys.get(i)?)?;
    Some(column.default.as_deref().unwrap_or(""))
}

/// One value as a SQL literal. JSON null and the text `null` in any case
/// become `null`; an empty value takes `default` when one is known.
fn sql_value(value: &Value, default: Option<&str>) -> String {
    let text = match value {
        Value::Null => return "null".to_string(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => u8::from(*flag).to_string(),
        other => other.to_string(),
    };
    if text.eq_ignore_ascii_case("null") {
        return "null".to_string();
    }
    let text = match default {
        Some(default) if text.is_empty() => default,
        _ => text.as_str(),
    };
    format!("'{}'", escape(text))
}

/// Backslash-escape a value for a single-quoted MySQL literal
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

fn value_cell(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Text("null".to_string()),
        Value::Bool(flag) => Cell::Bool(*flag),
        Value::Number(number) => number.as_f64().map_or_else(|| Cell::Text(number.to_string()), Cell::Number),
        Value::String(text) => Cell::Text(text.clone()),
        other => Cell::Text(other.to_string()),
    }
}

/// Rows of a data sheet. Row 1 holds the keys, skipping blanks and names
/// starting with `__`; rows with an empty first cell are skipped.
pub fn table_data_from_sheet(sheet: &Sheet) -> TableData {
    let key_columns: Vec<(usize, &String)> = sheet
        .row(0)
        .iter()
        .enumerate()
        .filter(|(_, key)| !key.is_empty() && !key.starts_with("__"))
        .collect();

    let values = (1..sheet.height())
        .filter(|&row| !sheet.cell(row, 0).is_empty())
        .map(|row| {
            key_columns
                .iter()
                .map(|&(col, _)| Value::String(sheet.cell(row, col).to_string()))
                .collect()
        })
        .collect();

    TableData {
        name: sheet.name.clone(),
        keys: key_columns.into_iter().map(|(_, key)| key.clone()).collect(),
        values,
    }
}

/// Load data from a single DSN or from JSON and xlsx documents
pub async fn load_data(inputs: &[String], filter: &TableFilter, database: &DatabaseConfig) -> Result<Data> {
    let Some(first) = inputs.first() else {
        return Err(Error::InvalidInput("no input given".to_string()));
    };
    if !is_dsn(first) {
        return load_data_files(inputs, filter);
    }
    if inputs.len() > 1 {
        return Err(Error::InvalidInput(format!(
            "a database DSN must be the only input, got {} inputs",
            inputs.len()
        )));
    }

    let connection = DatabaseConnection::connect_with_retry(first, database, false).await?;
    let data = read_database(&SqlExecutor::new(connection.clone()), filter).await;
    connection.close().await;
    data
}

async fn read_database(executor: &SqlExecutor, filter: &TableFilter) -> Result<Data> {
    let listing = executor.execute_script(LIST_TABLES).await?;
    let names: Vec<String> = listing
        .iter()
        .flat_map(|result| result.values.iter())
        .filter_map(|row| row.first().cloned().flatten())
        .filter(|name| filter.accepts(name))
        .collect();

    let mut data = Data::default();
    for name in names {
        let select = format!("SELECT * FROM {};", quote_identifier(&name));
        let Some(result) = executor.execute_script(&select).await?.into_iter().next() else {
            continue;
        };
        if !result.has_rows() {
            continue;
        }
        tracing::debug!(table = %name, rows = result.values.len(), "Read table data");
        let values = result
            .values
            .into_iter()
            .map(|row| row.into_iter().map(|v| v.map_or(Value::Null, Value::String)).collect())
            .collect();
        data.tables.push(TableData {
            name,
            keys: result.columns,
            values,
        });
    }
    Ok(data)
}

/// Load data from JSON and xlsx documents. Tables of the same name are merged.
pub fn load_data_files<P: AsRef<Path>>(inputs: &[P], filter: &TableFilter) -> Result<Data> {
    let mut data = Data::default();
    for path in inputs {
        let path = path.as_ref();
        let tables = match InputFormat::detect(path) {
            Some(InputFormat::Json) => serde_json::from_str::<Data>(&fs::read_to_string(path)?)?.tables,
            Some(InputFormat::Xlsx) => excel::read_workbook(path)?
                .iter()
                .map(table_data_from_sheet)
                .collect(),
            _ => {
                return Err(Error::InvalidInput(format!(
                    "data input must be one of [.json, .xlsx] or a DSN: {}",
                    path.display()
                )))
            }
        };

        for table in tables {
            if filter.accepts(&table.name) && !table.values.is_empty() {
                data.merge(table)?;
            }
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{Column, Table};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use tempfile::tempdir;

    fn users() -> TableData {
        TableData {
            name: "users".to_string(),
            keys: vec!["id".to_string(), "name".to_string(), "note".to_string()],
            values: vec![
                vec![json!("1"), json!("O'Brien"), json!("")],
                vec![json!(2), json!(null), json!("NULL")],
            ],
        }
    }

    #[test]
    fn test_to_sql() {
        let data = Data { tables: vec![users()] };

        assert_eq!(
            data.to_sql(None, true),
            "TRUNCATE `users`;\n\
             INSERT INTO `users` (`id`, `name`, `note`)\n\
             VALUES\n\
             ('1','O\\'Brien',''),\n\
             ('2',null,null);\n\n"
        );
        assert!(!data.to_sql(None, false).contains("TRUNCATE"));
    }

    #[test]
    fn test_empty_values_take_defined_default() {
        let mut table = Table::new("users");
        table.add_column(Column::new("note", "varchar(8)").default("none"));
        let defines = Schema::resolve(vec![table]).unwrap();

        let sql = Data { tables: vec![users()] }.to_sql(Some(&defines), false);
        assert!(sql.contains("('1','O\\'Brien','none')"));
    }

    #[test]
    fn test_tables_without_rows_are_skipped() {
        let empty = TableData {
            name: "empty".to_string(),
            keys: vec!["id".to_string()],
            values: vec![],
        };
        assert_eq!(Data { tables: vec![empty] }.to_sql(None, true), "");
    }

    #[rstest]
    #[case(&[], &[], "Users", true)]
    #[case(&["users"], &[], "Users", true)]
    #[case(&["posts"], &[], "users", false)]
    #[case(&[], &["UserLogs"], "user_logs", false)]
    fn test_filter(#[case] tables: &[&str], #[case] ignore: &[&str], #[case] name: &str, #[case] expected: bool) {
        let filter = TableFilter {
            tables: tables.iter().map(|t| t.to_string()).collect(),
            ignore_tables: ignore.iter().map(|t| t.to_string()).collect(),
        };
        assert_eq!(filter.accepts(name), expected);
    }

    #[rstest]
    #[case(None, Some("out/data.xlsx"), DataFormat::Xlsx)]
    #[case(None, Some("out/data.yaml"), DataFormat::Sql)]
    #[case(Some("json"), Some("out/data.sql"), DataFormat::Json)]
    #[case(None, None, DataFormat::Sql)]
    fn test_detect_format(#[case] format: Option<&str>, #[case] output: Option<&str>, #[case] expected: DataFormat) {
        assert_eq!(DataFormat::detect(format, output.map(Path::new)).unwrap(), expected);
    }

    #[test]
    fn test_merge_same_table() {
        let mut data = Data::default();
        data.merge(users()).unwrap();
        data.merge(users()).unwrap();
        assert_eq!(data.tables.len(), 1);
        assert_eq!(data.tables[0].values.len(), 4);

        let mut other = users();
        other.keys.pop();
        assert!(matches!(data.merge(other), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_data_sheet() {
        let rows = vec![
            vec!["id".to_string(), "__memo".to_string(), "name".to_string()],
            vec!["1".to_string(), "skip me".to_string(), "alice".to_string()],
            vec!["".to_string(), "".to_string(), "no id".to_string()],
            vec!["2".to_string()],
        ];
        let table = table_data_from_sheet(&Sheet::new("users", rows));

        assert_eq!(table.keys, vec!["id", "name"]);
        assert_eq!(table.values, vec![vec![json!("1"), json!("alice")], vec![json!("2"), json!("")]]);
    }

    #[test]
    fn test_files_merge_and_filter() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("users.json");
        let document = Data {
            tables: vec![users(), TableData { name: "logs".to_string(), ..users() }],
        };
        fs::write(&json_path, serde_json::to_vec(&document).unwrap()).unwrap();

        let book_path = dir.path().join("more.xlsx");
        let book = Data { tables: vec![users()] }.to_workbook().unwrap();
        fs::write(&book_path, book).unwrap();

        let filter = TableFilter {
            tables: vec![],
            ignore_tables: vec!["logs".to_string()],
        };
        let data = load_data_files(&[&json_path, &book_path], &filter).unwrap();

        assert_eq!(data.tables.len(), 1);
        let table = &data.tables[0];
        assert_eq!(table.values.len(), 4);
        assert_eq!(table.values[2], vec![json!("1"), json!("O'Brien"), json!("")]);
        assert_eq!(table.values[3], vec![json!("2"), json!("null"), json!("NULL")]);
    }

    #[test]
    fn test_unsupported_data_input() {
        let err = load_data_files(&[Path::new("rows.yaml")], &TableFilter::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
