//! Schema module for schema_plan
//!
//! This module holds the schema model and its resolver, type normalization,
//! the structural differ and the SQL emitter, plus live database analysis.

pub mod analyzer;
pub mod diff;
pub mod generator;
pub mod normalize;
pub mod resolver;
pub mod types;

// Re-export key types
pub use analyzer::{Analyzer, MySqlAnalyzer};
pub use diff::{ColumnChange, ColumnChangeKind, DiffOptions, MoveOperation, SchemaDiff, TableDiff};
pub use generator::{MigrationGenerator, MigrationScript, Placement};
pub use types::{Column, ColumnId, ForeignKeyEdge, Index, Schema, Table};
