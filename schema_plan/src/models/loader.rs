//! Schema loading
//!
//! Resolves the command-line inputs into a [`Schema`]: either one MySQL DSN
//! read through the analyzer, or any mix of JSON, YAML and xlsx documents
//! and directories containing them.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::DatabaseConfig;
use crate::db::connection::{is_dsn, DatabaseConnection};
use crate::error::{Error, Result};
use crate::models::excel;
use crate::schema::analyzer::{Analyzer, MySqlAnalyzer};
use crate::schema::types::{Schema, Table};
use crate::utils::naming::lower_snake;

/// A supported document format, detected from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Json,
    Yaml,
    Xlsx,
}

impl InputFormat {
    pub fn detect(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Some(InputFormat::Json),
            Some("yaml") | Some("yml") => Some(InputFormat::Yaml),
            Some("xlsx") => Some(InputFormat::Xlsx),
            _ => None,
        }
    }
}

/// JSON documents are either a bare table list or wrapped in `Tables`
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonDocument {
    List(Vec<Table>),
    Wrapped {
        #[serde(rename = "Tables")]
        tables: Vec<Table>,
    },
}

impl JsonDocument {
    fn into_tables(self) -> Vec<Table> {
        match self {
            JsonDocument::List(tables) | JsonDocument::Wrapped { tables } => tables,
        }
    }
}

/// Load and resolve a schema from `inputs`
pub async fn load_schema(ignore_tables: &[String], inputs: &[String], database: &DatabaseConfig) -> Result<Schema> {
    let Some(first) = inputs.first() else {
        return Err(Error::InvalidInput("no input given".to_string()));
    };

    if is_dsn(first) {
        if inputs.len() > 1 {
            return Err(Error::InvalidInput(format!(
                "a database DSN must be the only input, got {} inputs",
                inputs.len()
            )));
        }
        let connection = DatabaseConnection::connect_with_retry(first, database, false).await?;
        let schema = MySqlAnalyzer::new(connection.pool()).analyze_schema(ignore_tables).await;
        connection.close().await;
        return schema;
    }

    load_files(ignore_tables, inputs)
}

/// Load and resolve a schema from document files and directories
pub fn load_files<P: AsRef<Path>>(ignore_tables: &[String], inputs: &[P]) -> Result<Schema> {
    let mut tables = Vec::new();
    for path in expand_paths(inputs)? {
        let loaded = load_tables_from_file(&path)?;
        tracing::debug!(path = %path.display(), tables = loaded.len(), "Loaded schema document");
        tables.extend(loaded);
    }

    let tables = filter_ignored(tables, ignore_tables);
    tracing::info!(tables = tables.len(), "Resolving schema");
    Schema::resolve(tables)
}

/// Read one JSON, YAML or xlsx document into its tables
pub fn load_tables_from_file(path: &Path) -> Result<Vec<Table>> {
    let format = InputFormat::detect(path).ok_or_else(|| {
        Error::InvalidInput(format!(
            "input path must be one of [.json, .yaml, .yml, .xlsx]: {}",
            path.display()
        ))
    })?;

    let tables = match format {
        InputFormat::Json => serde_json::from_str::<JsonDocument>(&fs::read_to_string(path)?)?.into_tables(),
        InputFormat::Yaml => serde_yaml::from_str::<Option<Vec<Table>>>(&fs::read_to_string(path)?)?.unwrap_or_default(),
        InputFormat::Xlsx => excel::read_tables(path)?,
    };
    Ok(tables)
}

/// Expand directories into the files below them, in sorted order
fn expand_paths<P: AsRef<Path>>(inputs: &[P]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        let input = input.as_ref();
        let metadata = fs::metadata(input)?;
        if !metadata.is_dir() {
            paths.push(input.to_path_buf());
            continue;
        }

        for entry in WalkDir::new(input).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::IoError(e.into()))?;
            if entry.file_type().is_file() {
                paths.push(entry.into_path());
            }
        }
    }
    Ok(paths)
}

fn filter_ignored(tables: Vec<Table>, ignore_tables: &[String]) -> Vec<Table> {
    if ignore_tables.is_empty() {
        return tables;
    }
    let ignored: Vec<String> = ignore_tables.iter().map(|t| lower_snake(t)).collect();
    tables
        .into_iter()
        .filter(|table| {
            let skip = ignored.contains(&lower_snake(&table.name));
            if skip {
                tracing::debug!(table = %table.name, "Ignoring table");
            }
            !skip
        })
        .collect()
}
