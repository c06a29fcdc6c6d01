//! Output destinations
//!
//! Generated text goes to stdout, to a named file (overwritten), or to a new
//! file inside a directory.

use chrono::{DateTime, Local};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Where generated text is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
    Directory(PathBuf),
}

impl OutputTarget {
    /// Target for a migration script: an existing directory gets a new
    /// timestamped file, any other path is a file
    pub fn for_migration(output: Option<&Path>) -> Self {
        match output {
            None => OutputTarget::Stdout,
            Some(path) if path.is_dir() => OutputTarget::Directory(path.to_path_buf()),
            Some(path) => OutputTarget::File(path.to_path_buf()),
        }
    }

    /// Target for a schema conversion: a path without a known document
    /// extension is a directory of per-table files
    pub fn for_conversion(output: Option<&Path>, has_known_extension: bool) -> Self {
        match output {
            None => OutputTarget::Stdout,
            Some(path) if has_known_extension => OutputTarget::File(path.to_path_buf()),
            Some(path) => OutputTarget::Directory(path.to_path_buf()),
        }
    }
}

/// File name for a migration written into a directory
pub fn migration_file_name(now: DateTime<Local>, format: &str) -> String {
    format!("{}_{}.sql", now.format("%Y%m%d%H%M%S"), format)
}

/// Write a migration script. Returns the path written, if any.
pub fn write_migration(target: &OutputTarget, content: &str, format: &str) -> Result<Option<PathBuf>> {
    match target {
        OutputTarget::Stdout => {
            write_stdout(content)?;
            Ok(None)
        }
        OutputTarget::File(path) => {
            write_file(path, content.as_bytes())?;
            Ok(Some(path.clone()))
        }
        OutputTarget::Directory(dir) => {
            fs::create_dir_all(dir)?;
            let path = dir.join(migration_file_name(Local::now(), format));
            write_file(&path, content.as_bytes())?;
            Ok(Some(path))
        }
    }
}

/// Write `content` to a file, creating missing parent directories
pub fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    tracing::info!(path = %path.display(), bytes = content.len(), "Wrote output");
    Ok(())
}

pub fn write_stdout(content: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", content)?;
    stdout.flush()?;
    Ok(())
}
