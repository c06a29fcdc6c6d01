//! Models module for schema_plan
//!
//! This module turns input documents and databases into schemas, and schemas
//! back into documents. It also carries table row data and renders text
//! from templates.

pub mod data;
pub mod excel;
pub mod export;
pub mod loader;
pub mod template;

// Re-export key types
pub use data::{load_data, load_data_files, Data, DataFormat, TableData, TableFilter};
pub use export::{create_sql_diff, marshal_schema, marshal_table, ExportFormat};
pub use loader::{load_files, load_schema, InputFormat};
pub use template::{select_tables, write_generated, OverwriteMode, TemplateRenderer, WriteOutcome};
