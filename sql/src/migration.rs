//! Database migrations run as an initialization handler.
//!
//! ```yaml
//! database:
//!   host: localhost
//!   port: 5432
//!   database: orders
//!   user: app
//!   password: secret
//!   migration:
//!     enabled: true
//!     type: sqlx
//!     url: postgresql://${host}:${port}/${database}
//!     locations: migrations   # default
//! ```
//!
//! [`DatabaseMigrationHandler`] dispatches on `migration.type` to a
//! registered [`DatabaseMigration`]. When migrations are disabled or no
//! type is set, the handler logs a warning and succeeds.

use crate::error::{Result, SqlError};
use crate::pool::any_options;
use futures::FutureExt;
use futures::future::BoxFuture;
use launchpad_core::{ConfigTree, InitializationContext};
use launchpad_runtime::{InitializationHandler, Runtime};
use serde_json::Value;
use sqlx::AnyConnection;
use sqlx::any::AnyConnectOptions;
use sqlx::migrate::{Migrate, Migrator};
use sqlx::Connection;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// `type` of [`SqlxMigration`].
pub const SQLX_TYPE: &str = "sqlx";
/// Script directory used when `migration.locations` is absent.
pub const DEFAULT_LOCATIONS: &str = "migrations";

/// A migration engine selected by `database.migration.type`.
pub trait DatabaseMigration: Send + Sync {
    /// Value of `migration.type` selecting this engine.
    fn migration_type(&self) -> &str;

    /// Migrate the database described by `db_config`, the `database` section.
    fn migrate(&self, db_config: ConfigTree) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// Runs `sqlx` migration scripts from a directory.
///
/// The connection URL comes from `migration.url` (or `migration.jdbcUrl`),
/// with `${key}` placeholders replaced by values of the database section.
/// `user` and `password` are added when the URL has none.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxMigration;

impl SqlxMigration {
    /// Resolved connection options for `db`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::InvalidMigration`] if no URL is configured or it
    /// does not parse.
    pub fn connect_options(db: &ConfigTree) -> Result<AnyConnectOptions> {
        let template = ["/migration/url", "/migration/jdbcUrl", "/migration/jdbc-url"]
            .into_iter()
            .find_map(|pointer| db.get_str(pointer))
            .ok_or_else(|| SqlError::InvalidMigration("missing 'migration.url'".to_string()))?;

        let url = substitute(template, db.as_value());
        any_options(&url, db.get_str("/user"), db.get_str("/password"))
            .map_err(SqlError::InvalidMigration)
    }

    /// Apply every pending script and return the versions now applied.
    ///
    /// # Errors
    ///
    /// - [`SqlError::InvalidMigration`] if the URL is missing or malformed
    /// - [`SqlError::Migrate`] if the scripts cannot be read or applied
    /// - [`SqlError::Database`] if the database cannot be reached
    pub async fn run(db: &ConfigTree) -> Result<Vec<i64>> {
        let options = Self::connect_options(db)?;
        let locations = db.get_str_or("/migration/locations", DEFAULT_LOCATIONS);
        let migrator = Migrator::new(Path::new(locations)).await?;

        sqlx::any::install_default_drivers();
        let mut connection = AnyConnection::connect_with(&options).await?;
        migrator.run_direct(&mut connection).await?;

        let mut versions: Vec<i64> = connection
            .list_applied_migrations()
            .await?
            .into_iter()
            .map(|m| m.version)
            .collect();
        versions.sort_unstable();
        tracing::info!(
            locations,
            available = migrator.iter().count(),
            applied = versions.len(),
            version = versions.last(),
            "Migration finished"
        );
        connection.close().await?;
        Ok(versions)
    }
}

impl DatabaseMigration for SqlxMigration {
    fn migration_type(&self) -> &str {
        SQLX_TYPE
    }

    fn migrate(&self, db_config: ConfigTree) -> BoxFuture<'static, anyhow::Result<()>> {
        async move {
            Self::run(&db_config).await?;
            Ok(())
        }
        .boxed()
    }
}

/// Replace `${key}` with the scalar under `key` in `vars`.
///
/// Unknown keys are left as written.
fn substitute(template: &str, vars: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let key = &after[..end];
        match vars.get(key) {
            Some(Value::String(s)) => out.push_str(s),
            Some(value @ (Value::Number(_) | Value::Bool(_))) => out.push_str(&value.to_string()),
            _ => out.push_str(&rest[start..start + 3 + end]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Runs the migration selected by `database.migration.type`.
#[derive(Clone)]
pub struct DatabaseMigrationHandler {
    migrations: HashMap<String, Arc<dyn DatabaseMigration>>,
}

impl fmt::Debug for DatabaseMigrationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseMigrationHandler")
            .field("types", &self.migration_types())
            .finish()
    }
}

impl DatabaseMigrationHandler {
    /// Handler knowing the built-in [`SqlxMigration`].
    #[must_use]
    pub fn instance() -> Self {
        Self::with_migrations(vec![Arc::new(SqlxMigration)])
    }

    /// Handler knowing exactly `migrations`. A later entry with the same
    /// type replaces an earlier one.
    #[must_use]
    pub fn with_migrations(migrations: Vec<Arc<dyn DatabaseMigration>>) -> Self {
        Self {
            migrations: migrations
                .into_iter()
                .map(|m| (m.migration_type().to_string(), m))
                .collect(),
        }
    }

    /// Known migration types, sorted.
    #[must_use]
    pub fn migration_types(&self) -> Vec<&str> {
        let mut types: Vec<_> = self.migrations.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Migrate per `config`, or skip with a warning.
    ///
    /// # Errors
    ///
    /// Fails with [`SqlError::UnsupportedMigration`] for an unknown type, or
    /// with the migration's own error.
    pub fn run(&self, config: &ConfigTree) -> BoxFuture<'static, anyhow::Result<()>> {
        let db = config.section("/database").unwrap_or_default();
        let enabled = db.get_bool("/migration/enabled");
        let migration_type = db
            .get_str("/migration/type")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let Some(migration_type) = migration_type.filter(|_| enabled) else {
            tracing::warn!(
                "Migration skipped. Configurations `database.migration.enabled` is not `true` or `database.migration.type` is not set."
            );
            return async { Ok(()) }.boxed();
        };

        let Some(migration) = self.migrations.get(&migration_type).cloned() else {
            tracing::error!(migration_type = %migration_type, "Database migration type `{}` is not supported.", migration_type);
            return async move { Err(SqlError::UnsupportedMigration(migration_type).into()) }.boxed();
        };

        async move {
            tracing::debug!(migration_type = %migration_type, "Running database migration");
            migration.migrate(db).await.inspect_err(|e| {
                tracing::error!(migration_type = %migration_type, error = %format_args!("{e:#}"), "Migration failed.");
            })
        }
        .boxed()
    }
}

impl InitializationHandler for DatabaseMigrationHandler {
    fn handle(
        &self,
        _runtime: &Runtime,
        _context: &InitializationContext,
        config: &ConfigTree,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        self.run(config)
    }
}
