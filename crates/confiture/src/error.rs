//! Closed error taxonomy for confiture, organized by category (spec §7).
//!
//! Every leaf variant carries a stable code and can render a JSON context
//! object for structured logging / machine-readable CLI output.

use serde_json::{Value, json};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error, one variant per category.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error(transparent)]
    Seed(#[from] SeedError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Rebuild(#[from] RebuildError),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(e) => e.code(),
            Error::Schema(e) => e.code(),
            Error::Migration(e) => e.code(),
            Error::Sql(e) => e.code(),
            Error::Seed(e) => e.code(),
            Error::Hook(e) => e.code(),
            Error::Rebuild(e) => e.code(),
        }
    }

    pub fn context(&self) -> Value {
        match self {
            Error::Config(e) => e.context(),
            Error::Schema(e) => e.context(),
            Error::Migration(e) => e.context(),
            Error::Sql(e) => e.context(),
            Error::Seed(e) => e.context(),
            Error::Hook(e) => e.context(),
            Error::Rebuild(e) => e.context(),
        }
    }
}

/// Result type for confiture operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: searched from {start} up to filesystem root")]
    NotFound { start: PathBuf },

    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("missing required setting: {field}")]
    MissingField { field: String },

    #[error("directory not readable: {path} ({role})")]
    DirectoryUnreadable { path: PathBuf, role: String },

    #[error("invalid identifier {name:?}: {reason}")]
    InvalidIdentifier { name: String, reason: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::NotFound { .. } => "CONF_001",
            ConfigError::Io { .. } => "CONF_002",
            ConfigError::Parse { .. } => "CONF_003",
            ConfigError::MissingField { .. } => "CONF_004",
            ConfigError::DirectoryUnreadable { .. } => "CONF_005",
            ConfigError::InvalidIdentifier { .. } => "CONF_006",
        }
    }

    pub fn context(&self) -> Value {
        match self {
            ConfigError::NotFound { start } => json!({ "start": start }),
            ConfigError::Io { path, .. } => json!({ "path": path }),
            ConfigError::Parse { path, message } => json!({ "path": path, "message": message }),
            ConfigError::MissingField { field } => json!({ "field": field }),
            ConfigError::DirectoryUnreadable { path, role } => {
                json!({ "path": path, "role": role })
            }
            ConfigError::InvalidIdentifier { name, reason } => {
                json!({ "name": name, "reason": reason })
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse DDL in {path}: {message}")]
    ParseFailed { path: PathBuf, message: String },

    #[error("unclosed block comment in {path} starting at line {line}")]
    UnclosedComment { path: PathBuf, line: usize },

    #[error("comment spillover: {from} ends inside a block comment that swallows {into}")]
    CommentSpillover { from: PathBuf, into: PathBuf },

    #[error("lint failed with {count} violation(s)")]
    LintFailed { count: usize },

    #[error("snapshot build failed: {message}")]
    SnapshotBuildFailed { message: String },
}

impl SchemaError {
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::ParseFailed { .. } => "SCHM_001",
            SchemaError::UnclosedComment { .. } => "SCHM_002",
            SchemaError::CommentSpillover { .. } => "SCHM_003",
            SchemaError::LintFailed { .. } => "SCHM_004",
            SchemaError::SnapshotBuildFailed { .. } => "SCHM_005",
        }
    }

    pub fn context(&self) -> Value {
        match self {
            SchemaError::ParseFailed { path, message } => {
                json!({ "path": path, "message": message })
            }
            SchemaError::UnclosedComment { path, line } => json!({ "path": path, "line": line }),
            SchemaError::CommentSpillover { from, into } => json!({ "from": from, "into": into }),
            SchemaError::LintFailed { count } => json!({ "count": count }),
            SchemaError::SnapshotBuildFailed { message } => json!({ "message": message }),
        }
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("duplicate migration version {version:?} found in {first:?} and {second:?}")]
    DuplicateVersion {
        version: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("migration name conflict: {name:?} used by both {first:?} and {second:?}")]
    NameConflict {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("migration {version} has no matching down file (expected {expected:?})")]
    MissingDown { version: String, expected: PathBuf },

    #[error(
        "lock acquisition timed out after {timeout_ms}ms{}",
        competing.as_ref().map(|c| format!(" (held by {c})")).unwrap_or_default()
    )]
    LockTimeout {
        timeout_ms: u64,
        competing: Option<String>,
    },

    #[error("failed to apply migration {version} ({name}): {underlying}")]
    Apply {
        version: String,
        name: String,
        #[source]
        underlying: Box<Error>,
    },

    #[error("failed to roll back migration {version} ({name}): {underlying}")]
    Rollback {
        version: String,
        name: String,
        #[source]
        underlying: Box<Error>,
    },

    #[error("tracking table {table} does not exist")]
    StoreUnavailable { table: String },

    #[error("statement timed out after {timeout_ms}ms while applying {version}")]
    Timeout { version: String, timeout_ms: u64 },
}

impl MigrationError {
    pub fn code(&self) -> &'static str {
        match self {
            MigrationError::DuplicateVersion { .. } => "MIGR_100",
            MigrationError::NameConflict { .. } => "MIGR_101",
            MigrationError::MissingDown { .. } => "MIGR_102",
            MigrationError::LockTimeout { .. } => "MIGR_103",
            MigrationError::Apply { .. } => "MIGR_104",
            MigrationError::Rollback { .. } => "MIGR_105",
            MigrationError::StoreUnavailable { .. } => "MIGR_106",
            MigrationError::Timeout { .. } => "MIGR_107",
        }
    }

    pub fn context(&self) -> Value {
        match self {
            MigrationError::DuplicateVersion {
                version,
                first,
                second,
            } => json!({ "version": version, "first": first, "second": second }),
            MigrationError::NameConflict {
                name,
                first,
                second,
            } => json!({ "name": name, "first": first, "second": second }),
            MigrationError::MissingDown { version, expected } => {
                json!({ "version": version, "expected": expected })
            }
            MigrationError::LockTimeout {
                timeout_ms,
                competing,
            } => json!({ "timeout_ms": timeout_ms, "competing": competing }),
            MigrationError::Apply { version, name, .. } => {
                json!({ "version": version, "name": name })
            }
            MigrationError::Rollback { version, name, .. } => {
                json!({ "version": version, "name": name })
            }
            MigrationError::StoreUnavailable { table } => json!({ "table": table }),
            MigrationError::Timeout {
                version,
                timeout_ms,
            } => json!({ "version": version, "timeout_ms": timeout_ms }),
        }
    }
}

/// Wraps a PostgreSQL error with the failing statement text and parameters.
#[derive(Debug, Error)]
#[error(
    "SQL error{}: {source} (statement: {statement_preview})",
    sqlstate.as_ref().map(|s| format!(" [{s}]")).unwrap_or_default()
)]
pub struct SqlError {
    pub statement_preview: String,
    pub sqlstate: Option<String>,
    #[source]
    pub source: tokio_postgres::Error,
}

impl SqlError {
    pub fn new(statement: &str, source: tokio_postgres::Error) -> Self {
        let sqlstate = source.code().map(|c| c.code().to_string());
        SqlError {
            statement_preview: preview(statement, 200),
            sqlstate,
            source,
        }
    }

    pub fn code(&self) -> &'static str {
        "SQL_001"
    }

    pub fn context(&self) -> Value {
        json!({
            "statement_preview": self.statement_preview,
            "sqlstate": self.sqlstate,
        })
    }
}

fn preview(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("{violation_count} validation violation(s) in seed data")]
    ValidationFailed { violation_count: usize },

    #[error("failed to load seed file {path}: {underlying}")]
    LoadFailed {
        path: PathBuf,
        #[source]
        underlying: Box<Error>,
    },

    #[error("seed file {path} could not be parsed: {message}")]
    ParseFailed { path: PathBuf, message: String },
}

impl SeedError {
    pub fn code(&self) -> &'static str {
        match self {
            SeedError::ValidationFailed { .. } => "SEED_001",
            SeedError::LoadFailed { .. } => "SEED_002",
            SeedError::ParseFailed { .. } => "SEED_003",
        }
    }

    pub fn context(&self) -> Value {
        match self {
            SeedError::ValidationFailed { violation_count } => {
                json!({ "violation_count": violation_count })
            }
            SeedError::LoadFailed { path, .. } => json!({ "path": path }),
            SeedError::ParseFailed { path, message } => {
                json!({ "path": path, "message": message })
            }
        }
    }
}

#[derive(Debug, Error)]
#[error("hook {hook_name} failed in phase {phase}: {underlying}")]
pub struct HookError {
    pub hook_name: String,
    pub phase: String,
    #[source]
    pub underlying: Box<Error>,
}

impl HookError {
    pub fn code(&self) -> &'static str {
        "HOOK_001"
    }

    pub fn context(&self) -> Value {
        json!({ "hook_name": self.hook_name, "phase": self.phase })
    }
}

#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("rebuild requires confirmation (pass --yes or confirm interactively)")]
    ConfirmationRequired,

    #[error("operator declined to drop schema {schema}")]
    SchemaDropRefused { schema: String },

    #[error("structural verification failed after rebuild: {message}")]
    VerificationFailed { message: String },
}

impl RebuildError {
    pub fn code(&self) -> &'static str {
        match self {
            RebuildError::ConfirmationRequired => "REBD_001",
            RebuildError::SchemaDropRefused { .. } => "REBD_002",
            RebuildError::VerificationFailed { .. } => "REBD_003",
        }
    }

    pub fn context(&self) -> Value {
        match self {
            RebuildError::ConfirmationRequired => json!({}),
            RebuildError::SchemaDropRefused { schema } => json!({ "schema": schema }),
            RebuildError::VerificationFailed { message } => json!({ "message": message }),
        }
    }
}

impl From<tokio_postgres::Error> for Error {
    fn from(e: tokio_postgres::Error) -> Self {
        Error::Sql(SqlError::new("", e))
    }
}
