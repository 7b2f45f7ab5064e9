//! Error types for pool creation and migrations.

use thiserror::Error;

/// Errors creating a pool or running a migration.
#[derive(Error, Debug)]
pub enum SqlError {
    // ═══════════════════════════════════════════════════════════════════════
    // Configuration Errors
    // ═══════════════════════════════════════════════════════════════════════
    /// No configuration object under the requested root.
    #[error("Database configuration for root '{0}' not exists.")]
    MissingConfiguration(String),

    /// The database section has no `type`.
    #[error("Database type is not set for root '{0}'.")]
    MissingType(String),

    /// No pool constructor is registered for the `type`.
    #[error("Database type '{0}' is not supported.")]
    UnsupportedType(String),

    /// `pool` settings do not deserialize.
    #[error("Invalid database pool settings: {0}")]
    InvalidPoolSettings(String),

    /// Connection settings are present but unusable.
    #[error("Invalid {db_type} connection settings: {reason}")]
    InvalidConnection {
        /// Database type being configured
        db_type: String,
        /// What was wrong
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Migration Errors
    // ═══════════════════════════════════════════════════════════════════════
    /// No migration is registered for `migration.type`.
    #[error("Database migration type `{0}` is not supported.")]
    UnsupportedMigration(String),

    /// The migration section lacks a required setting.
    #[error("Invalid migration configuration: {0}")]
    InvalidMigration(String),

    /// Migration scripts could not be loaded or applied.
    #[error("Migration failed")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// The migration database could not be reached.
    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

/// Result type alias for SQL operations.
pub type Result<T> = std::result::Result<T, SqlError>;
