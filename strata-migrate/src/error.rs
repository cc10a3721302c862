//! Error types for the migration engine.

use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation error.
    #[error("Database error: {0}")]
    Database(String),

    /// Inspector or registry failure during change detection.
    #[error("Detection error: {0}")]
    Detection(String),

    /// Plan validation failure (circular foreign-key dependencies).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Destructive or review-required change under a disallowing mode.
    #[error("Migration mode '{mode}' does not permit this: {reason}")]
    ModeViolation {
        /// The offending mode.
        mode: String,
        /// What the mode refused.
        reason: String,
    },

    /// Unsupported operation for the target dialect.
    #[error("Generation error: {0}")]
    Generation(String),

    /// DDL execution failure; the file's transaction was rolled back.
    #[error("Execution failed for statement `{statement}`: {message}")]
    Application {
        /// The failing statement.
        statement: String,
        /// Driver error text.
        message: String,
    },

    /// Tracking-table I/O failure.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Invalid migration file or format.
    #[error("Invalid migration: {0}")]
    InvalidMigration(String),

    /// No schema changes between models and database.
    #[error("No schema changes detected")]
    NoChanges,

    /// Live schema differences exist but no migration files cover them.
    #[error("Schema changes detected but no migration files exist; generate migration files first")]
    NoMigrationFiles,

    /// Deliberately deferred capability.
    #[error("Not yet implemented: {0}")]
    NotImplemented(String),
}

impl MigrationError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a detection error.
    pub fn detection(msg: impl Into<String>) -> Self {
        Self::Detection(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a mode-violation error.
    pub fn mode_violation(mode: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModeViolation {
            mode: mode.into(),
            reason: reason.into(),
        }
    }

    /// Create a generation error.
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// Create an application error carrying the failing statement.
    pub fn application(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Application {
            statement: statement.into(),
            message: message.into(),
        }
    }

    /// Create a ledger error.
    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    /// Create an invalid-migration error.
    pub fn invalid_migration(msg: impl Into<String>) -> Self {
        Self::InvalidMigration(msg.into())
    }

    /// Create a not-implemented error.
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Whether the condition clears up without operator intervention.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NoChanges | Self::NoMigrationFiles)
    }
}
