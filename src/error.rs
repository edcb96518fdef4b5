use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by backup/restore handlers and connection construction.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("unsupported database type '{0}'")]
    UnsupportedDbType(String),

    #[error("no backup/restore handler available for {0} databases")]
    NoHandler(String),

    #[error("cannot connect to {target}: {reason}")]
    Connection { target: String, reason: String },

    #[error("invalid handler state: {0}")]
    InvalidState(String),

    #[error("backup artifact {} not found", .0.display())]
    MissingBackup(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid exclusion pattern: {0}")]
    Pattern(#[from] ignore::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Which side of the lifecycle a handler was being created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    Backup,
    Restore,
}

impl fmt::Display for CleanupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupAction::Backup => f.write_str("backup"),
            CleanupAction::Restore => f.write_str("restore"),
        }
    }
}

/// Database-specific cleanup failures.
#[derive(Debug, Error)]
pub enum DatabaseCleanupError {
    #[error("cannot derive a database connection for {unit}")]
    InvalidDescriptor {
        unit: String,
        #[source]
        source: HandlerError,
    },

    /// The handler could not be created: database unreachable or misconfigured.
    #[error("cannot create {action} handler for {unit}")]
    Connection {
        action: CleanupAction,
        unit: String,
        #[source]
        source: HandlerError,
    },

    #[error("could not back up {unit}")]
    Capture {
        unit: String,
        #[source]
        source: HandlerError,
    },

    #[error("could not restore {unit}")]
    Restore {
        unit: String,
        #[source]
        source: HandlerError,
    },
}

impl DatabaseCleanupError {
    pub fn handler_error(&self) -> &HandlerError {
        match self {
            DatabaseCleanupError::InvalidDescriptor { source, .. }
            | DatabaseCleanupError::Connection { source, .. }
            | DatabaseCleanupError::Capture { source, .. }
            | DatabaseCleanupError::Restore { source, .. } => source,
        }
    }
}

/// Error surfaced by every environment unit operation.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("could not back up {unit}")]
    Backup {
        unit: String,
        #[source]
        source: HandlerError,
    },

    #[error("could not restore {unit}")]
    Restore {
        unit: String,
        #[source]
        source: HandlerError,
    },

    #[error(transparent)]
    Database(#[from] DatabaseCleanupError),

    #[error("invalid environment configuration: {0}")]
    Config(String),
}

impl CleanupError {
    /// The collaborator failure that caused this error, if any.
    pub fn root_cause(&self) -> Option<&HandlerError> {
        match self {
            CleanupError::Backup { source, .. } | CleanupError::Restore { source, .. } => Some(source),
            CleanupError::Database(db) => Some(db.handler_error()),
            CleanupError::Config(_) => None,
        }
    }
}

pub type Result<T, E = CleanupError> = std::result::Result<T, E>;
