use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HandlerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Mysql,
    Postgres,
    Sqlite,
    Mssql,
    Oracle,
}

impl FromStr for DbType {
    type Err = HandlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(DbType::Mysql),
            "postgres" | "postgresql" | "pgsql" => Ok(DbType::Postgres),
            "sqlite" | "sqlite3" => Ok(DbType::Sqlite),
            "mssql" | "sqlserver" => Ok(DbType::Mssql),
            "oracle" => Ok(DbType::Oracle),
            other => Err(HandlerError::UnsupportedDbType(other.to_string())),
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DbType::Mysql => "MySQL",
            DbType::Postgres => "PostgreSQL",
            DbType::Sqlite => "SQLite",
            DbType::Mssql => "MSSQL",
            DbType::Oracle => "Oracle",
        };
        f.write_str(name)
    }
}

/// Credentials and location of the database under test, as written in the
/// environment manifest.
#[derive(Clone, Serialize, Deserialize)]
pub struct TestBox {
    pub db_type: String,
    #[serde(default)]
    pub host: String,
    pub db_name: String,
    #[serde(default)]
    pub db_user: String,
    #[serde(default)]
    pub db_pass: String,
    #[serde(default)]
    pub db_port: Option<u16>,
}

impl fmt::Debug for TestBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestBox")
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_port", &self.db_port)
            .finish_non_exhaustive()
    }
}

/// Descriptor of a live database. Units share it (`Arc<DbConnection>`) and
/// never close it; handlers open and release their own sessions from it.
#[derive(Clone, PartialEq, Eq)]
pub struct DbConnection {
    pub db_type: DbType,
    pub host: String,
    pub port: Option<u16>,
    /// Database name, or the database file for SQLite.
    pub db_name: String,
    pub user: String,
    password: String,
    pub custom_properties: BTreeMap<String, serde_json::Value>,
}

impl DbConnection {
    pub fn new(db_type: DbType, host: impl Into<String>, db_name: impl Into<String>) -> Self {
        Self {
            db_type,
            host: host.into(),
            port: None,
            db_name: db_name.into(),
            user: String::new(),
            password: String::new(),
            custom_properties: BTreeMap::new(),
        }
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        Self::new(DbType::Sqlite, "localhost", path.to_string_lossy().into_owned())
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Derive a connection descriptor from test box credentials.
    ///
    /// Fails fast on an unknown database type or a descriptor that cannot
    /// address any database; nothing is retried.
    pub fn from_test_box(
        test_box: &TestBox,
        custom_properties: BTreeMap<String, serde_json::Value>,
    ) -> Result<Self, HandlerError> {
        let db_type: DbType = test_box.db_type.parse()?;

        if test_box.db_name.trim().is_empty() {
            return Err(HandlerError::Connection {
                target: format!("{} on {}", db_type, test_box.host),
                reason: "database name is empty".into(),
            });
        }
        if db_type != DbType::Sqlite && test_box.host.trim().is_empty() {
            return Err(HandlerError::Connection {
                target: format!("{} database {}", db_type, test_box.db_name),
                reason: "host is empty".into(),
            });
        }

        Ok(Self {
            db_type,
            host: test_box.host.clone(),
            port: test_box.db_port,
            db_name: test_box.db_name.clone(),
            user: test_box.db_user.clone(),
            password: test_box.db_pass.clone(),
            custom_properties,
        })
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Printable address of the database, without credentials.
    pub fn target(&self) -> String {
        match self.db_type {
            DbType::Sqlite => self.db_name.clone(),
            _ => match self.port {
                Some(port) => format!("{}:{}/{}", self.host, port, self.db_name),
                None => format!("{}/{}", self.host, self.db_name),
            },
        }
    }
}

impl fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConnection")
            .field("db_type", &self.db_type)
            .field("target", &self.target())
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

fn default_lock() -> bool {
    true
}

/// A table to capture, with optional narrowing of what gets captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbTable {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    /// Row filter (a `WHERE` condition) applied when the handler supports it.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub columns_to_exclude: Vec<String>,
    #[serde(default = "default_lock")]
    pub lock: bool,
}

impl DbTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            filter: None,
            columns_to_exclude: Vec::new(),
            lock: true,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn exclude_column(mut self, column: impl Into<String>) -> Self {
        self.columns_to_exclude.push(column.into());
        self
    }

    pub fn full_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}
