//! SQL executor
//!
//! This module splits raw SQL text into statements and runs them in order on
//! one connection, collecting the rows each statement returns.

use serde::Serialize;
use sqlx::{Column, Executor, Row};

use crate::db::connection::DatabaseConnection;
use crate::error::Result;

/// Rows returned by one statement, every value rendered as text
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct StatementResult {
    #[serde(rename = "SQL")]
    pub sql: String,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<String>>>,
}

impl StatementResult {
    pub fn has_rows(&self) -> bool {
        !self.values.is_empty()
    }
}

/// SQL executor for running scripts
pub struct SqlExecutor {
    connection: DatabaseConnection,
}

impl SqlExecutor {
    /// Create a new SQL executor
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    /// Execute every statement of `script` in order on a single connection,
    /// so session variables set by one statement are seen by the next
    pub async fn execute_script(&self, script: &str) -> Result<Vec<StatementResult>> {
        let mut conn = self.connection.pool().acquire().await?;
        let mut results = Vec::new();

        for sql in split_statements(script) {
            tracing::debug!(sql = %sql, "Executing statement");
            let rows = (&mut *conn).fetch_all(sql.as_str()).await?;

            let columns: Vec<String> = rows
                .first()
                .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default();

            let mut values = Vec::with_capacity(rows.len());
            for row in &rows {
                let mut record = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    let raw: Option<Vec<u8>> = row.try_get_unchecked(i)?;
                    record.push(raw.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()));
                }
                values.push(record);
            }

            results.push(StatementResult { sql, columns, values });
        }

        Ok(results)
    }
}

/// Split SQL text on `;`, ignoring semicolons inside quotes and comments.
///
/// Each statement keeps its terminating `;`. A trailing remainder that is not
/// blank becomes the last statement.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    let (mut pre, mut prepre) = ('\0', '\0');
    let mut line_comment = false;
    let mut block_comment = false;
    let mut quote: Option<char> = None;
    let mut escape = false;

    for c in sql.chars() {
        current.push(c);
        let (p, pp) = (pre, prepre);
        prepre = pre;
        pre = c;

        if line_comment {
            if c == '\n' || c == '\r' {
                line_comment = false;
            }
            continue;
        }
        if block_comment {
            if c == '/' && p == '*' {
                block_comment = false;
            }
            continue;
        }

        if escape {
            escape = false;
            continue;
        }
        if c == '\\' {
            escape = true;
            continue;
        }

        match quote {
            Some(open) => {
                if c == open {
                    quote = None;
                }
                continue;
            }
            None if c == '\'' || c == '"' || c == '`' => {
                quote = Some(c);
                continue;
            }
            None => {}
        }

        match c {
            '#' => line_comment = true,
            ' ' if p == '-' && pp == '-' => line_comment = true,
            '*' if p == '/' => {
                block_comment = true;
                // the opening `*` must not close the comment
                pre = '\0';
            }
            ';' => push_statement(&mut statements, std::mem::take(&mut current)),
            _ => {}
        }
    }

    if !current.trim().is_empty() {
        push_statement(&mut statements, current);
    }

    statements
}

fn push_statement(statements: &mut Vec<String>, statement: String) {
    let trimmed = statement.trim();
    if trimmed.is_empty() || trimmed == ";" {
        return;
    }
    statements.push(trimmed.to_string());
}
