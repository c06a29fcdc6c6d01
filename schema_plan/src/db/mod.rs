//! Database module for schema_plan
//!
//! This module handles MySQL connections and raw script execution.

pub mod connection;
pub mod executor;

// Re-export key types
pub use connection::DatabaseConnection;
pub use executor::{split_statements, SqlExecutor, StatementResult};
