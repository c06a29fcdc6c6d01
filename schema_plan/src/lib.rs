//! schema_plan: plans MySQL schema migrations by diffing two schema snapshots
//!
//! A snapshot is loaded from JSON, YAML or xlsx documents or from a live
//! database. The planner compares an old and a new snapshot and emits a
//! forward (`alter`) script together with its exact inverse (`revert`).

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod schema;
pub mod utils;

// Re-export main types for easier access
pub use config::{Config, DiffFormat};
pub use db::connection::DatabaseConnection;
pub use error::{Error, ErrorKind, Result};
pub use schema::diff::{DiffOptions, SchemaDiff};
pub use schema::generator::{MigrationGenerator, MigrationScript};
pub use schema::types::{Column, Index, Schema, Table};

/// Initialize a planner with the specified configuration file
pub fn init(config_path: &str) -> Result<Planner> {
    let config = config::load_from_file(config_path)?;
    Ok(Planner::new(config))
}

/// Diff two schemas and build both scripts
pub fn plan_migration(old: &Schema, new: &Schema, options: &DiffOptions) -> Result<MigrationScript> {
    let diff = SchemaDiff::generate(old, new, options)?;
    if diff.is_empty() {
        tracing::info!("Schemas are identical, nothing to migrate");
        return Ok(MigrationScript::default());
    }
    MigrationGenerator::new(&diff).generate()
}

/// The main client: loads snapshots and plans migrations between them
pub struct Planner {
    config: Config,
}

impl Planner {
    /// Create a new planner from configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            foreign_key: self.config.diff.foreign_key,
        }
    }

    /// Load a snapshot from files, directories or a single DSN
    pub async fn load_schema(&self, inputs: &[String]) -> Result<Schema> {
        models::load_schema(&self.config.diff.ignore_tables, inputs, &self.config.database).await
    }

    /// Plan the migration from `old` to `new`
    pub fn plan(&self, old: &Schema, new: &Schema) -> Result<MigrationScript> {
        plan_migration(old, new, &self.diff_options())
    }

    /// Render the migration from `old` to `new` in the configured format.
    /// An empty string means there is nothing to migrate.
    pub fn render(&self, old: &Schema, new: &Schema) -> Result<String> {
        match self.config.diff.format {
            DiffFormat::Diff => models::create_sql_diff(old, new, self.config.diff.foreign_key),
            format => self.plan(old, new)?.render(format),
        }
    }
}
