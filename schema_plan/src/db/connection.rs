//! Database connection handling
//!
//! This module provides functionality to establish MySQL connections from
//! either a `mysql://` URL or a `user:pass@tcp(host:port)/db` style DSN.

use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{MySql, Pool};
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

/// Longest a single connection attempt may wait
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// A MySQL connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    pool: Pool<MySql>,
}

impl DatabaseConnection {
    /// Connect once
    pub async fn connect(dsn: &str, config: &DatabaseConfig) -> Result<Self> {
        let options = connect_options(dsn)?;
        let attempt_timeout = ATTEMPT_TIMEOUT.min(Duration::from_secs(config.timeout_seconds.max(1)));

        let pool = MySqlPoolOptions::new()
            .max_connections(config.pool_size.max(1))
            .acquire_timeout(attempt_timeout)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Connect, retrying once per second until `timeout_seconds` have passed
    pub async fn connect_with_retry(dsn: &str, config: &DatabaseConfig, quiet: bool) -> Result<Self> {
        let deadline = Instant::now() + Duration::from_secs(config.timeout_seconds);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match Self::connect(dsn, config).await {
                Ok(connection) => {
                    tracing::debug!(attempt, "Connected to database");
                    return Ok(connection);
                }
                Err(Error::InvalidInput(message)) => return Err(Error::InvalidInput(message)),
                Err(e) => {
                    if !quiet {
                        tracing::warn!(attempt, error = %e, "Connection failed, retrying");
                    }
                    if Instant::now() >= deadline {
                        return Err(Error::Timeout(format!(
                            "could not connect within {} seconds: {}",
                            config.timeout_seconds, e
                        )));
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    pub fn pool(&self) -> &Pool<MySql> {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Whether an input string names a database rather than a file
pub fn is_dsn(input: &str) -> bool {
    input.starts_with("mysql://") || (input.contains(':') && !std::path::Path::new(input).exists())
}

/// The parts of a `user:pass@tcp(host:port)/db?params` DSN
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DsnParts {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub socket: Option<String>,
    pub database: String,
    pub params: Vec<(String, String)>,
}

impl DsnParts {
    pub fn parse(dsn: &str) -> Result<Self> {
        let dsn = dsn.trim();
        let slash = dsn
            .rfind('/')
            .ok_or_else(|| Error::InvalidInput(format!("DSN has no database part: {}", dsn)))?;
        let (head, tail) = (&dsn[..slash], &dsn[slash + 1..]);
        let (database, params) = tail.split_once('?').unwrap_or((tail, ""));

        let (credentials, address) = match head.rfind('@') {
            Some(at) => (Some(&head[..at]), &head[at + 1..]),
            None => (None, head),
        };

        let mut parts = DsnParts {
            database: database.to_string(),
            host: "localhost".to_string(),
            ..Default::default()
        };

        if let Some(credentials) = credentials {
            match credentials.split_once(':') {
                Some((user, password)) => {
                    parts.user = Some(user.to_string());
                    parts.password = Some(password.to_string());
                }
                None => parts.user = Some(credentials.to_string()),
            }
        }

        if let Some(inner) = address.strip_prefix("tcp(").and_then(|a| a.strip_suffix(')')) {
            parts.set_address(inner)?;
        } else if let Some(inner) = address.strip_prefix("unix(").and_then(|a| a.strip_suffix(')')) {
            parts.socket = Some(inner.to_string());
        } else if !address.is_empty() && address != "tcp" {
            parts.set_address(address)?;
        }

        parts.params = params
            .split('&')
            .filter(|kv| !kv.is_empty())
            .map(|kv| match kv.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (kv.to_string(), String::new()),
            })
            .collect();

        Ok(parts)
    }

    fn set_address(&mut self, address: &str) -> Result<()> {
        match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| Error::InvalidInput(format!("DSN port is not a number: {}", address)))?;
                self.host = host.to_string();
                self.port = Some(port);
            }
            None => self.host = address.to_string(),
        }
        Ok(())
    }

    pub fn connect_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new().host(&self.host);
        if let Some(port) = self.port {
            options = options.port(port);
        }
        if let Some(socket) = &self.socket {
            options = options.socket(socket);
        }
        if let Some(user) = &self.user {
            options = options.username(user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        if !self.database.is_empty() {
            options = options.database(&self.database);
        }
        for (key, value) in &self.params {
            match key.as_str() {
                "charset" => options = options.charset(value),
                "collation" => options = options.collation(value),
                _ => tracing::debug!(param = %key, "Ignoring DSN parameter"),
            }
        }
        options
    }
}

/// Connection options for a `mysql://` URL or a `user:pass@tcp(host:port)/db` DSN
pub fn connect_options(dsn: &str) -> Result<MySqlConnectOptions> {
    let dsn = dsn.trim();
    if dsn.starts_with("mysql://") {
        return Ok(MySqlConnectOptions::from_str(dsn)?);
    }
    Ok(DsnParts::parse(dsn)?.connect_options())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parts(user: Option<&str>, password: Option<&str>, host: &str, port: Option<u16>, database: &str) -> DsnParts {
        DsnParts {
            user: user.map(str::to_string),
            password: password.map(str::to_string),
            host: host.to_string(),
            port,
            database: database.to_string(),
            ..Default::default()
        }
    }

    #[rstest]
    #[case("root:secret@tcp(127.0.0.1:3306)/app", parts(Some("root"), Some("secret"), "127.0.0.1", Some(3306), "app"))]
    #[case("root:p@ss@tcp(db)/app", parts(Some("root"), Some("p@ss"), "db", None, "app"))]
    #[case("u:a/b?c#d@tcp(db:1)/app", parts(Some("u"), Some("a/b?c#d"), "db", Some(1), "app"))]
    #[case("/app", parts(None, None, "localhost", None, "app"))]
    #[case("db.internal:3307/app", parts(None, None, "db.internal", Some(3307), "app"))]
    fn test_parse_dsn(#[case] dsn: &str, #[case] expected: DsnParts) {
        assert_eq!(DsnParts::parse(dsn).unwrap(), expected);
    }

    #[test]
    fn test_parse_dsn_socket_and_params() {
        let parsed = DsnParts::parse("u:p@unix(/tmp/mysql.sock)/app?charset=utf8mb4&parseTime=true").unwrap();

        assert_eq!(parsed.socket.as_deref(), Some("/tmp/mysql.sock"));
        assert_eq!(parsed.host, "localhost");
        assert_eq!(
            parsed.params,
            vec![
                ("charset".to_string(), "utf8mb4".to_string()),
                ("parseTime".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_dsn_without_database() {
        assert!(matches!(DsnParts::parse("root:pw@tcp(host:1)"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_dsn_with_bad_port() {
        assert!(matches!(DsnParts::parse("root@tcp(host:abc)/app"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_connect_options_accepts_both_forms() {
        assert!(connect_options("root:pw@tcp(localhost:3306)/app").is_ok());
        assert!(connect_options("mysql://root:pw@localhost:3306/app").is_ok());
    }

    #[test]
    fn test_is_dsn() {
        assert!(is_dsn("root:pw@tcp(localhost:3306)/app"));
        assert!(is_dsn("mysql://localhost/app"));
        assert!(!is_dsn("schema/tables.yaml"));
    }
}
