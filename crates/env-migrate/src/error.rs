//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing environment variables, bad URLs, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),

    /// All provisioning strategies failed for a table.
    #[error("Provisioning failed for table {table}: {message}")]
    Provision { table: String, message: String },

    /// Data copy failed for a specific table.
    #[error("Copy failed for table {table}: {message}")]
    Copy { table: String, message: String },

    /// Destination bootstrap command failed.
    #[error("Bootstrap command failed: {0}")]
    Bootstrap(String),

    /// Media host HTTP error.
    #[error("Media host error: {0}")]
    Media(#[from] reqwest::Error),

    /// Media host rejected an upload.
    #[error("Media upload rejected: {0}")]
    Upload(String),

    /// IO error (bootstrap process, file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Provision error.
    pub fn provision(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Provision {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Copy error.
    pub fn copy(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Copy {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error class.
    ///
    /// Per-table and per-asset failures are reported, not raised, so any
    /// error that reaches the CLI is fatal and maps to a non-zero code.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) => 2,
            _ => 1,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_use_distinct_exit_code() {
        assert_eq!(MigrateError::Config("missing".into()).exit_code(), 2);
        assert_eq!(
            MigrateError::provision("partners", "exhausted").exit_code(),
            1
        );
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "sh not found");
        let err = MigrateError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error"));
        assert!(detailed.contains("Caused by"));
    }
}
