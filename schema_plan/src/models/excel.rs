//! Spreadsheet (xlsx) documents
//!
//! A schema workbook holds one sheet per table. Row 1 describes the table,
//! the rows from 3 on describe its columns, and the block after the row
//! whose first cell is `Indexes` describes its indexes:
//!
//! ```text
//!   | A        | B     | C       | D               | E  | F       | G     | H         | I
//! 0 | Table    | Name  | Engine  | Default Charset |    |         |       |           | Comment
//! 1 |          | users | InnoDB  | utf8mb4         |    |         |       |           | members
//! 2 | Columns  | Name  | Type    | Nullable        | PK | Default | Extra | Reference | Comment
//! 3 |          | id    | bigint  |                 | 1  |         | auto_increment
//! 4 | Indexes  | Name  | Columns | Unique          |    |         |       |           | Comment
//! 5 |          | idx_a | a,b     | 1               |
//! ```
//!
//! Sheets whose name starts with `_` are notes and are skipped.

use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use rust_xlsxwriter::{Color, ColNum, Format, RowNum, Workbook, Worksheet};
use std::path::Path;

use crate::error::{Error, Result};
use crate::schema::types::{Column, Index, Table};
use crate::utils::naming::lower_snake;

const TABLE_HEADER: [&str; 9] = ["Table", "Name", "Engine", "Default Charset", "", "", "", "", "Comment"];
const COLUMN_HEADER: [&str; 9] = [
    "Columns", "Name", "Type", "Nullable", "PK", "Default", "Extra", "Reference", "Comment",
];
const INDEX_HEADER: [&str; 9] = ["Indexes", "Name", "Columns", "Unique", "", "", "", "", "Comment"];

/// First row of the column block
const FIRST_COLUMN_ROW: usize = 3;

/// One worksheet as trimmed cell text, indexed from A1
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: &str, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.to_string(),
            rows,
        }
    }

    fn from_range(name: String, range: &Range<Data>) -> Self {
        let (first_row, first_col) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<Vec<String>> = vec![Vec::new(); first_row as usize + range.height()];

        for (r, c, value) in range.cells() {
            let text = value.to_string();
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let row = &mut rows[first_row as usize + r];
            let col = first_col as usize + c;
            if row.len() <= col {
                row.resize(col + 1, String::new());
            }
            row[col] = text.to_string();
        }

        Self { name, rows }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Cell text, empty when the cell is blank or out of range
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .map_or("", String::as_str)
    }

    pub fn row(&self, row: usize) -> &[String] {
        self.rows.get(row).map_or(&[], Vec::as_slice)
    }

    fn optional(&self, row: usize, col: usize) -> Option<String> {
        Some(self.cell(row, col)).filter(|v| !v.is_empty()).map(str::to_string)
    }

    /// A record row of a block: column A blank, column B filled
    fn is_record(&self, row: usize) -> bool {
        row < self.height() && self.cell(row, 0).is_empty() && !self.cell(row, 1).is_empty()
    }
}

/// Every sheet of the workbook at `path`, skipping `_`-prefixed ones
pub fn read_workbook(path: &Path) -> Result<Vec<Sheet>> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        if name.starts_with('_') {
            continue;
        }
        let range = workbook.worksheet_range(&name)?;
        sheets.push(Sheet::from_range(name, &range));
    }
    Ok(sheets)
}

/// Read the tables of a schema workbook
pub fn read_tables(path: &Path) -> Result<Vec<Table>> {
    read_workbook(path)?.iter().map(table_from_sheet).collect()
}

pub fn table_from_sheet(sheet: &Sheet) -> Result<Table> {
    let name = sheet.cell(1, 1);
    if name.is_empty() {
        return Err(Error::InvalidInput(format!(
            "sheet `{}` has no table name in B2",
            sheet.name
        )));
    }

    let mut table = Table::new(name);
    table.engine = sheet.optional(1, 2);
    table.default_charset = sheet.optional(1, 3);
    table.comment = sheet.optional(1, 8);

    let mut row = FIRST_COLUMN_ROW;
    while sheet.is_record(row) {
        table.add_column(column_from_row(sheet, row)?);
        row += 1;
    }

    let indexes_at = (0..sheet.height()).find(|&r| sheet.cell(r, 0) == "Indexes");
    if let Some(header) = indexes_at {
        let mut row = header + 1;
        while sheet.is_record(row) {
            table.add_index(index_from_row(sheet, row));
            row += 1;
        }
    }

    Ok(table)
}

fn column_from_row(sheet: &Sheet, row: usize) -> Result<Column> {
    let mut column = Column::new(sheet.cell(row, 1), &sheet.cell(row, 2).to_lowercase());
    column.not_null = sheet.cell(row, 3).is_empty();

    let primary_key = sheet.cell(row, 4);
    if !primary_key.is_empty() {
        column.primary_key = primary_key.parse().map_err(|_| {
            Error::InvalidInput(format!(
                "sheet `{}` row {}: PK must be a number, got `{}`",
                sheet.name,
                row + 1,
                primary_key
            ))
        })?;
    }

    let default = sheet.cell(row, 5);
    if !default.is_empty() {
        column.default = Some(default.trim_matches('\'').to_string());
    }
    column.extra = sheet.optional(row, 6);
    column.reference = sheet.optional(row, 7).map(|r| {
        r.split('.').map(lower_snake).collect::<Vec<_>>().join(".")
    });
    column.comment = sheet.optional(row, 8);
    Ok(column)
}

fn index_from_row(sheet: &Sheet, row: usize) -> Index {
    let mut index = Index::new(&lower_snake(sheet.cell(row, 1)), &[]);
    index.column_names = sheet
        .cell(row, 2)
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    index.unique = !sheet.cell(row, 3).is_empty();
    index.comment = sheet.optional(row, 8);
    index
}

/// A value to write into one cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl From<&str> for Cell {
    fn from(text: &str) -> Self {
        Cell::Text(text.to_string())
    }
}

impl From<Option<&String>> for Cell {
    fn from(text: Option<&String>) -> Self {
        Cell::Text(text.cloned().unwrap_or_default())
    }
}

/// Fills a worksheet top to bottom
pub struct SheetWriter<'a> {
    sheet: &'a mut Worksheet,
    header: &'a Format,
    row: RowNum,
}

impl<'a> SheetWriter<'a> {
    pub fn new(sheet: &'a mut Worksheet, header: &'a Format) -> Self {
        Self { sheet, header, row: 0 }
    }

    /// A row of header-styled labels starting at column A
    pub fn header_row(&mut self, labels: &[&str]) -> Result<()> {
        for (col, label) in labels.iter().enumerate() {
            let col = col as ColNum;
            if label.is_empty() {
                self.sheet.write_blank(self.row, col, self.header)?;
            } else {
                self.sheet.write_string_with_format(self.row, col, *label, self.header)?;
            }
        }
        self.row += 1;
        Ok(())
    }

    /// A row of values starting at `first_col`; empty text is left blank
    pub fn values_row(&mut self, first_col: ColNum, cells: &[Cell]) -> Result<()> {
        for (i, cell) in cells.iter().enumerate() {
            let col = first_col + i as ColNum;
            match cell {
                Cell::Text(text) if text.is_empty() => {}
                Cell::Text(text) => {
                    self.sheet.write_string(self.row, col, text.as_str())?;
                }
                Cell::Number(number) => {
                    self.sheet.write_number(self.row, col, *number)?;
                }
                Cell::Bool(value) => {
                    self.sheet.write_boolean(self.row, col, *value)?;
                }
            }
        }
        self.row += 1;
        Ok(())
    }

    /// A block record: styled blank in column A, values from column B
    fn record_row(&mut self, cells: &[Cell]) -> Result<()> {
        self.sheet.write_blank(self.row, 0, self.header)?;
        self.values_row(1, cells)
    }
}

/// White on dark grey, for header rows and the block margin
pub fn header_format() -> Format {
    Format::new()
        .set_background_color(Color::RGB(0x606060))
        .set_font_color(Color::White)
}

/// Serialize tables into a schema workbook, one sheet per table
pub fn write_tables(tables: &[Table]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header = header_format();

    for table in tables {
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name(table))?;
        write_table(&mut SheetWriter::new(sheet, &header), table)?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn sheet_name(table: &Table) -> &str {
    if table.key().is_empty() {
        &table.name
    } else {
        table.key()
    }
}

fn write_table(writer: &mut SheetWriter<'_>, table: &Table) -> Result<()> {
    writer.header_row(&TABLE_HEADER)?;
    writer.record_row(&[
        table.name.as_str().into(),
        table.engine.as_ref().into(),
        table.default_charset.as_ref().into(),
        "".into(),
        "".into(),
        "".into(),
        "".into(),
        table.comment.as_ref().into(),
    ])?;

    writer.header_row(&COLUMN_HEADER)?;
    for column in &table.columns {
        let primary_key = match column.primary_key {
            0 => Cell::Text(String::new()),
            ordinal => Cell::Number(f64::from(ordinal)),
        };
        let default: Cell = match column.default.as_deref() {
            Some("") => "''".into(),
            other => Cell::Text(other.unwrap_or_default().to_string()),
        };
        writer.record_row(&[
            column.name.as_str().into(),
            column.data_type.as_str().into(),
            (if column.not_null { "" } else { "1" }).into(),
            primary_key,
            default,
            column.extra.as_ref().into(),
            column.reference.as_ref().into(),
            column.comment.as_ref().into(),
        ])?;
    }

    writer.header_row(&INDEX_HEADER)?;
    for index in &table.indexes {
        writer.record_row(&[
            index.name.as_str().into(),
            index.column_names.join(",").as_str().into(),
            (if index.unique { "1" } else { "" }).into(),
            "".into(),
            "".into(),
            "".into(),
            "".into(),
            index.comment.as_ref().into(),
        ])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::Schema;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn rows(cells: &[&[&str]]) -> Vec<Vec<String>> {
        cells
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn users_sheet() -> Sheet {
        Sheet::new(
            "users",
            rows(&[
                &["Table", "Name", "Engine", "Default Charset"],
                &["", "Users", "InnoDB", "utf8mb4", "", "", "", "", "members"],
                &["Columns", "Name", "Type", "Nullable", "PK", "Default"],
                &["", "id", "BIGINT", "", "1", "", "auto_increment"],
                &["", "team_id", "int", "1", "", "", "", "Team.Id"],
                &["", "name", "varchar(32)", "", "", "'guest'", "", "", "display name"],
                &["Indexes", "Name", "Columns", "Unique"],
                &["", "idxTeamName", "team_id, name", "1"],
                &["", "", "ignored"],
                &["", "idx_after_gap", "name"],
            ]),
        )
    }

    #[test]
    fn test_table_from_sheet() {
        let table = table_from_sheet(&users_sheet()).unwrap();

        assert_eq!(table.name, "Users");
        assert_eq!(table.engine.as_deref(), Some("InnoDB"));
        assert_eq!(table.comment.as_deref(), Some("members"));

        let id = &table.columns[0];
        assert_eq!(id.data_type, "bigint");
        assert!(id.not_null);
        assert_eq!(id.primary_key, 1);
        assert_eq!(id.extra.as_deref(), Some("auto_increment"));

        let team = &table.columns[1];
        assert!(!team.not_null);
        assert_eq!(team.reference.as_deref(), Some("team.id"));

        let name = &table.columns[2];
        assert_eq!(name.default.as_deref(), Some("guest"));
        assert_eq!(name.comment.as_deref(), Some("display name"));

        assert_eq!(table.indexes.len(), 1);
        assert_eq!(table.indexes[0].name, "idx_team_name");
        assert_eq!(table.indexes[0].column_names, vec!["team_id", "name"]);
        assert!(table.indexes[0].unique);
    }

    #[test]
    fn test_sheet_without_table_name() {
        let sheet = Sheet::new("broken", rows(&[&["Table"], &["", ""]]));
        assert!(matches!(table_from_sheet(&sheet), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_bad_primary_key_ordinal() {
        let sheet = Sheet::new(
            "t",
            rows(&[&["Table"], &["", "t"], &["Columns"], &["", "id", "int", "", "first"]]),
        );
        assert!(matches!(table_from_sheet(&sheet), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_workbook_reads_back() {
        let mut users = Table::new("users").engine("InnoDB").comment("members");
        users.add_column(Column::new("id", "bigint").not_null().primary_key(1).extra("auto_increment"));
        users.add_column(Column::new("nick", "varchar(16)").default(""));
        users.add_column(Column::new("team_id", "int").reference("teams.id"));
        users.add_index(Index::new("idx_nick", &["nick", "team_id"]).unique());
        let mut teams = Table::new("teams");
        teams.add_column(Column::new("id", "int").not_null().primary_key(1));
        let schema = Schema::resolve(vec![users, teams]).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("schema.xlsx");
        fs::write(&path, write_tables(schema.tables()).unwrap()).unwrap();
        let tables = read_tables(&path).unwrap();
        let reloaded = Schema::resolve(tables).unwrap();

        let users = reloaded.table("users").unwrap();
        assert_eq!(users.column_names(), vec!["id", "nick", "team_id"]);
        assert_eq!(users.engine.as_deref(), Some("InnoDB"));
        assert_eq!(users.column("id").unwrap().primary_key, 1);
        assert!(users.column("id").unwrap().not_null);
        assert_eq!(users.column("nick").unwrap().default.as_deref(), Some(""));
        assert!(!users.column("nick").unwrap().not_null);
        assert_eq!(users.column("team_id").unwrap().reference.as_deref(), Some("teams.id"));
        assert_eq!(users.index("idx_nick").unwrap().column_names, vec!["nick", "team_id"]);
        assert!(reloaded.table("teams").is_some());
    }
}
