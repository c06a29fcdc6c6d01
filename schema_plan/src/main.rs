//! schema_plan CLI
//!
//! Command-line tool for diffing, converting and executing MySQL schemas,
//! moving table data, and generating text from schemas.

use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::info;

use schema_plan::config::{self, Config, DiffFormat};
use schema_plan::db::{DatabaseConnection, SqlExecutor};
use schema_plan::models::{
    load_data, marshal_schema, marshal_table, select_tables, write_generated, DataFormat, ExportFormat,
    OverwriteMode, TableFilter, TemplateRenderer, WriteOutcome,
};
use schema_plan::utils::logging::init_logging;
use schema_plan::utils::output::{write_file, write_migration, write_stdout, OutputTarget};
use schema_plan::{Planner, Schema};

/// Plans MySQL schema migrations from schema documents and live databases.
#[derive(Parser)]
#[command(name = "schema_plan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the migration from OLD to INPUTS.
    Diff {
        /// Schema to migrate from (file, directory or DSN); empty if not given.
        #[arg(long)]
        old: Option<String>,

        /// Output format.
        #[arg(short, long, value_enum)]
        format: Option<DiffFormat>,

        /// Output file, or directory for a timestamp-named file.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compare references and emit foreign keys.
        #[arg(long)]
        foreign_key: bool,

        /// Tables to leave out (repeatable or comma separated).
        #[arg(long, value_delimiter = ',')]
        ignore_tables: Vec<String>,

        /// Schema documents, directories, or a single DSN.
        #[arg(required = true)]
        inputs: Vec<String>,
    },

    /// Convert a schema between documents, SQL and databases.
    Conv {
        /// Output format: sql, json, yaml, yml or xlsx (default: from OUTPUT's extension, else sql).
        #[arg(short, long)]
        format: Option<String>,

        /// Output file, or directory for one file per table.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit foreign keys in SQL output.
        #[arg(long)]
        foreign_key: bool,

        /// Tables to leave out (repeatable or comma separated).
        #[arg(long, value_delimiter = ',')]
        ignore_tables: Vec<String>,

        /// Schema documents, directories, or a single DSN.
        #[arg(required = true)]
        inputs: Vec<String>,
    },

    /// Execute SQL against a database and print returned rows as JSON.
    Exec {
        /// Database DSN.
        dsn: String,

        /// SQL file; stdin is read when neither this nor --execute is given.
        sqlfile: Option<PathBuf>,

        /// SQL text to execute.
        #[arg(short = 'e', long = "execute")]
        sql: Option<String>,

        /// Seconds to keep retrying the connection.
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Do not report connection attempts.
        #[arg(short, long)]
        quiet: bool,
    },

    /// Convert table data between JSON, xlsx, databases and INSERT scripts.
    Data {
        /// Output format: sql, json or xlsx (default: from OUTPUT's extension, else sql).
        #[arg(short, long)]
        format: Option<String>,

        /// Output file; stdout when not given.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Tables to take; all when not given.
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,

        /// Tables to leave out (repeatable or comma separated).
        #[arg(long, value_delimiter = ',')]
        ignore_tables: Vec<String>,

        /// Schema inputs whose column defaults fill empty values in SQL output.
        #[arg(long, value_delimiter = ',')]
        defines: Vec<String>,

        /// Do not emit TRUNCATE before each table's INSERT.
        #[arg(long)]
        skip_truncate: bool,

        /// Data documents (JSON, xlsx) or a single DSN.
        #[arg(required = true)]
        inputs: Vec<String>,
    },

    /// Render one template over every table.
    GenSingle {
        /// Template file (Jinja syntax).
        template: PathBuf,

        /// Output file; stdout when not given.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Tables to take; all when not given.
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,

        /// Tables to leave out (repeatable or comma separated).
        #[arg(long, value_delimiter = ',')]
        ignore_tables: Vec<String>,

        /// Schema documents, directories, or a single DSN.
        #[arg(required = true)]
        inputs: Vec<String>,
    },

    /// Render one template per table into files named by a path template.
    GenMultiple {
        /// Template file (Jinja syntax).
        template: PathBuf,

        /// Output path template, rendered with `table` and `tables`.
        output_pattern: String,

        /// What to do with existing output.
        #[arg(long, value_enum, default_value_t = OverwriteMode::Force)]
        overwrite: OverwriteMode,

        /// Tables to take; all when not given.
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,

        /// Tables to leave out (repeatable or comma separated).
        #[arg(long, value_delimiter = ',')]
        ignore_tables: Vec<String>,

        /// Schema documents, directories, or a single DSN.
        #[arg(required = true)]
        inputs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_from_file(&path.to_string_lossy())?,
        None => Config::default(),
    };
    init_logging(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Diff {
            old,
            format,
            output,
            foreign_key,
            ignore_tables,
            inputs,
        } => {
            config.diff.foreign_key |= foreign_key;
            config.diff.ignore_tables.extend(ignore_tables);
            if let Some(format) = format {
                config.diff.format = format;
            }
            let output = output.or_else(|| config.output.directory.clone().map(PathBuf::from));
            let format = config.diff.format;

            let planner = Planner::new(config);
            let new = planner.load_schema(&inputs).await?;
            let old = match old {
                Some(old) => planner.load_schema(&[old]).await?,
                None => Schema::empty(),
            };

            let rendered = planner.render(&old, &new)?;
            if rendered.is_empty() {
                info!("No differences found");
                return Ok(());
            }

            let target = OutputTarget::for_migration(output.as_deref());
            if let Some(path) = write_migration(&target, &rendered, format.as_str())? {
                println!("{}", path.display());
            }
        }

        Commands::Conv {
            format,
            output,
            foreign_key,
            ignore_tables,
            inputs,
        } => {
            config.diff.foreign_key |= foreign_key;
            config.diff.ignore_tables.extend(ignore_tables);
            let foreign_key = config.diff.foreign_key;

            let planner = Planner::new(config);
            let schema = planner.load_schema(&inputs).await?;
            let format = ExportFormat::detect(format.as_deref(), output.as_deref())?;
            let known_extension = output
                .as_deref()
                .and_then(ExportFormat::from_extension)
                .is_some();

            match OutputTarget::for_conversion(output.as_deref(), known_extension) {
                OutputTarget::Directory(dir) => write_per_table(&dir, &schema, format, foreign_key)?,
                OutputTarget::File(path) => {
                    write_file(&path, &marshal_schema(&schema, format, foreign_key)?)?;
                }
                OutputTarget::Stdout if format.is_binary() => {
                    bail!("{} output cannot be written to stdout, pass --output", format)
                }
                OutputTarget::Stdout => {
                    let bytes = marshal_schema(&schema, format, foreign_key)?;
                    write_stdout(&String::from_utf8_lossy(&bytes))?;
                }
            }
        }

        Commands::Exec {
            dsn,
            sqlfile,
            sql,
            timeout,
            quiet,
        } => {
            if let Some(timeout) = timeout {
                config.database.timeout_seconds = timeout;
            }

            let sql = read_sql(sql, sqlfile.as_deref())?;
            if sql.is_empty() {
                info!("No SQL to execute");
                return Ok(());
            }

            let connection = DatabaseConnection::connect_with_retry(&dsn, &config.database, quiet).await?;
            let executor = SqlExecutor::new(connection.clone());
            let results = executor.execute_script(&sql).await;
            connection.close().await;

            for result in results?.iter().filter(|r| r.has_rows()) {
                println!("{}", serde_json::to_string_pretty(result)?);
            }
        }

        Commands::Data {
            format,
            output,
            tables,
            ignore_tables,
            defines,
            skip_truncate,
            inputs,
        } => {
            let format = DataFormat::detect(format.as_deref(), output.as_deref())?;
            if format == DataFormat::Xlsx && output.is_none() {
                bail!("xlsx output cannot be written to stdout, pass --output");
            }

            let filter = TableFilter { tables, ignore_tables };
            let data = load_data(&inputs, &filter, &config.database).await?;
            let defines = if defines.is_empty() {
                None
            } else {
                Some(Planner::new(config).load_schema(&defines).await?)
            };

            let bytes = data.marshal(format, defines.as_ref(), !skip_truncate)?;
            match output {
                Some(path) => write_file(&path, &bytes)?,
                None => write_stdout(&String::from_utf8_lossy(&bytes))?,
            }
        }

        Commands::GenSingle {
            template,
            output,
            tables,
            ignore_tables,
            inputs,
        } => {
            let source = std::fs::read_to_string(&template)?;
            let schema = Planner::new(config).load_schema(&inputs).await?;
            let selected = select_tables(&schema, &tables, &ignore_tables);

            let rendered = TemplateRenderer::new().render_single(&source, &selected)?;
            match output {
                Some(path) => {
                    write_file(&path, rendered.as_bytes())?;
                    println!("write: {}", path.display());
                }
                None => write_stdout(&rendered)?,
            }
        }

        Commands::GenMultiple {
            template,
            output_pattern,
            overwrite,
            tables,
            ignore_tables,
            inputs,
        } => {
            let source = std::fs::read_to_string(&template)?;
            let schema = Planner::new(config).load_schema(&inputs).await?;
            let selected = select_tables(&schema, &tables, &ignore_tables);

            let outputs = TemplateRenderer::new().render_each(&source, &output_pattern, &selected)?;
            for (path, outcome) in write_generated(&outputs, overwrite)? {
                match outcome {
                    WriteOutcome::Written => println!("write: {}", path.display()),
                    WriteOutcome::Skipped => println!("skip: {}", path.display()),
                }
            }
        }
    }

    Ok(())
}

/// One `<table>.<format>` file per table
fn write_per_table(dir: &Path, schema: &Schema, format: ExportFormat, foreign_key: bool) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    for table in schema.tables() {
        let path = dir.join(format!("{}.{}", table.key(), format));
        write_file(&path, &marshal_table(table, format, foreign_key)?)?;
    }
    Ok(())
}

/// SQL from `--execute`, else the file, else piped stdin
fn read_sql(sql: Option<String>, sqlfile: Option<&Path>) -> anyhow::Result<String> {
    let text = match (sql, sqlfile) {
        (Some(sql), _) => sql,
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) if !std::io::stdin().is_terminal() => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
        (None, None) => String::new(),
    };
    Ok(text.trim().to_string())
}
