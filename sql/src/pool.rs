//! SQL pools built from configuration.
//!
//! The `type` of the database section selects a constructor from a
//! [`PoolRegistry`]:
//!
//! ```yaml
//! database:
//!   type: postgresql        # postgresql | mysql | mssql | jdbc
//!   host: localhost
//!   port: 5432
//!   database: orders
//!   user: app
//!   password: secret
//!   pool:
//!     max-size: 4
//!     connection-timeout: 30
//! ```
//!
//! `jdbc` reads a URL instead, `jdbc:` prefix optional:
//!
//! ```yaml
//! database:
//!   type: jdbc
//!   jdbc-url: jdbc:postgresql://localhost:5432/orders
//!   user: app
//!   password: secret
//! ```
//!
//! `mssql` also reads `trust-server-certificate` and accepts an ADO
//! (`server=tcp:host,1433;...`) or JDBC (`jdbc:sqlserver://...`) string
//! under `url`.
//!
//! Pools connect lazily: creating one never touches the network. `oracle`
//! has no built-in constructor.

use crate::error::{Result, SqlError};
use bb8_tiberius::ConnectionManager;
use launchpad_core::ConfigTree;
use serde::Deserialize;
use serde_json::Value;
use sqlx::any::AnyConnectOptions;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::pool::PoolOptions;
use sqlx::postgres::PgConnectOptions;
use sqlx::{AnyPool, Database, MySqlPool, PgPool};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tiberius::{AuthMethod, Config as MsSqlConfig};

/// `type` of a `PostgreSQL` database.
pub const POSTGRESQL_TYPE: &str = "postgresql";
/// `type` of a `MySQL` database.
pub const MYSQL_TYPE: &str = "mysql";
/// `type` of a database reached through a connection URL.
pub const JDBC_TYPE: &str = "jdbc";
/// `type` of an Oracle database. No built-in constructor.
pub const ORACLE_TYPE: &str = "oracle";
/// `type` of a SQL Server database.
pub const MSSQL_TYPE: &str = "mssql";

/// Root read by [`PoolRegistry::create`].
pub const DEFAULT_DATABASE_CONFIG_ROOT: &str = "database";

/// Pool sizing and timeouts, from the `pool` object of the database section.
///
/// Durations are in seconds. Keys are kebab-case; camelCase is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PoolSettings {
    /// Maximum open connections
    #[serde(alias = "maxSize")]
    pub max_size: u32,
    /// Connections kept open while idle
    #[serde(alias = "minSize")]
    pub min_size: u32,
    /// How long to wait for a connection
    #[serde(alias = "connectionTimeout")]
    pub connection_timeout: u64,
    /// Idle connections older than this are closed
    #[serde(alias = "idleTimeout")]
    pub idle_timeout: Option<u64>,
    /// Connections older than this are closed
    #[serde(alias = "maxLifetime")]
    pub max_lifetime: Option<u64>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 4,
            min_size: 0,
            connection_timeout: 30,
            idle_timeout: None,
            max_lifetime: None,
        }
    }
}

impl PoolSettings {
    /// Settings under `pool` in `db`, defaults when absent.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::InvalidPoolSettings`] if `pool` does not deserialize.
    pub fn from_section(db: &ConfigTree) -> Result<Self> {
        db.deserialize_at::<Self>("/pool")
            .map(Option::unwrap_or_default)
            .map_err(|e| SqlError::InvalidPoolSettings(e.to_string()))
    }

    /// `sqlx` pool options for these settings.
    #[must_use]
    pub fn options<DB: Database>(&self) -> PoolOptions<DB> {
        let mut options = PoolOptions::<DB>::new()
            .max_connections(self.max_size)
            .min_connections(self.min_size)
            .acquire_timeout(Duration::from_secs(self.connection_timeout));
        if let Some(idle) = self.idle_timeout {
            options = options.idle_timeout(Duration::from_secs(idle));
        }
        if let Some(lifetime) = self.max_lifetime {
            options = options.max_lifetime(Duration::from_secs(lifetime));
        }
        options
    }

    /// `bb8` builder for these settings.
    #[must_use]
    pub fn bb8_builder<M: bb8::ManageConnection>(&self) -> bb8::Builder<M> {
        bb8::Pool::builder()
            .max_size(self.max_size)
            .min_idle((self.min_size > 0).then_some(self.min_size))
            .connection_timeout(Duration::from_secs(self.connection_timeout))
            .idle_timeout(self.idle_timeout.map(Duration::from_secs))
            .max_lifetime(self.max_lifetime.map(Duration::from_secs))
    }
}

/// A SQL Server pool with the settings it was built from.
#[derive(Clone)]
pub struct MsSqlPool {
    pool: bb8::Pool<ConnectionManager>,
    config: MsSqlConfig,
    max_size: u32,
}

impl MsSqlPool {
    /// The underlying `bb8` pool.
    #[must_use]
    pub const fn pool(&self) -> &bb8::Pool<ConnectionManager> {
        &self.pool
    }

    /// Connection settings handed to every new connection.
    #[must_use]
    pub const fn config(&self) -> &MsSqlConfig {
        &self.config
    }
}

impl fmt::Debug for MsSqlPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MsSqlPool")
            .field("addr", &self.config.get_addr())
            .field("max_size", &self.max_size)
            .field("state", &self.pool.state())
            .finish()
    }
}

/// A pool for one of the supported databases.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SqlPool {
    /// `PostgreSQL`
    Postgres(PgPool),
    /// `MySQL`
    MySql(MySqlPool),
    /// SQL Server
    MsSql(MsSqlPool),
    /// Driver chosen by URL scheme
    Any(AnyPool),
}

impl SqlPool {
    /// Which variant this is: `postgresql`, `mysql`, `mssql` or `jdbc`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Postgres(_) => POSTGRESQL_TYPE,
            Self::MySql(_) => MYSQL_TYPE,
            Self::MsSql(_) => MSSQL_TYPE,
            Self::Any(_) => JDBC_TYPE,
        }
    }

    /// The `PostgreSQL` pool, if this is one.
    #[must_use]
    pub const fn as_postgres(&self) -> Option<&PgPool> {
        match self {
            Self::Postgres(pool) => Some(pool),
            _ => None,
        }
    }

    /// The `MySQL` pool, if this is one.
    #[must_use]
    pub const fn as_mysql(&self) -> Option<&MySqlPool> {
        match self {
            Self::MySql(pool) => Some(pool),
            _ => None,
        }
    }

    /// The SQL Server pool, if this is one.
    #[must_use]
    pub const fn as_mssql(&self) -> Option<&MsSqlPool> {
        match self {
            Self::MsSql(pool) => Some(pool),
            _ => None,
        }
    }

    /// The URL-driven pool, if this is one.
    #[must_use]
    pub const fn as_any(&self) -> Option<&AnyPool> {
        match self {
            Self::Any(pool) => Some(pool),
            _ => None,
        }
    }

    /// Configured maximum number of connections.
    #[must_use]
    pub fn max_connections(&self) -> u32 {
        match self {
            Self::Postgres(pool) => pool.options().get_max_connections(),
            Self::MySql(pool) => pool.options().get_max_connections(),
            Self::MsSql(pool) => pool.max_size,
            Self::Any(pool) => pool.options().get_max_connections(),
        }
    }

    /// Close every connection and refuse new acquisitions.
    ///
    /// A SQL Server pool has no close; its connections go when the last
    /// clone is dropped.
    pub async fn close(&self) {
        match self {
            Self::Postgres(pool) => pool.close().await,
            Self::MySql(pool) => pool.close().await,
            Self::MsSql(pool) => {
                tracing::debug!(addr = %pool.config.get_addr(), "SQL Server pool released on drop");
            }
            Self::Any(pool) => pool.close().await,
        }
    }
}

type PoolConstructor = Arc<dyn Fn(&ConfigTree, &PoolSettings) -> Result<SqlPool> + Send + Sync>;

/// Maps database `type` values to pool constructors.
///
/// Built once, usually at start-up, and shared by reference.
///
/// # Example
///
/// ```
/// use launchpad_core::ConfigTree;
/// use launchpad_sql::PoolRegistry;
/// use serde_json::json;
///
/// let registry = PoolRegistry::default();
/// assert_eq!(registry.supported_types(), vec!["jdbc", "mssql", "mysql", "postgresql"]);
///
/// let config = ConfigTree::new(json!({ "database": { "type": "oracle" } }));
/// let error = registry.create(&config).unwrap_err();
/// assert_eq!(error.to_string(), "Database type 'oracle' is not supported.");
/// ```
#[derive(Clone)]
pub struct PoolRegistry {
    constructors: HashMap<String, PoolConstructor>,
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("types", &self.supported_types())
            .finish()
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::empty()
            .register(POSTGRESQL_TYPE, postgres_pool)
            .register(MYSQL_TYPE, mysql_pool)
            .register(MSSQL_TYPE, mssql_pool)
            .register(JDBC_TYPE, jdbc_pool)
    }
}

impl PoolRegistry {
    /// A registry with no constructors.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register `constructor` for `db_type`, replacing any previous one.
    ///
    /// The constructor receives the database section and its pool settings.
    #[must_use]
    pub fn register<F>(mut self, db_type: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&ConfigTree, &PoolSettings) -> Result<SqlPool> + Send + Sync + 'static,
    {
        self.constructors.insert(db_type.into(), Arc::new(constructor));
        self
    }

    /// Registered types, sorted.
    #[must_use]
    pub fn supported_types(&self) -> Vec<&str> {
        let mut types: Vec<_> = self.constructors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Create the pool described by the `database` section.
    ///
    /// # Errors
    ///
    /// See [`create_at`](Self::create_at).
    pub fn create(&self, config: &ConfigTree) -> Result<SqlPool> {
        self.create_at(config, DEFAULT_DATABASE_CONFIG_ROOT)
    }

    /// Create the pool described by the section at `root`.
    ///
    /// # Errors
    ///
    /// - [`SqlError::MissingConfiguration`] if `root` is not an object
    /// - [`SqlError::MissingType`] if it has no `type`
    /// - [`SqlError::UnsupportedType`] if no constructor is registered
    /// - [`SqlError::InvalidPoolSettings`] if `pool` is malformed
    /// - whatever the constructor reports
    pub fn create_at(&self, config: &ConfigTree, root: &str) -> Result<SqlPool> {
        let db = config
            .get_object(&format!("/{root}"))
            .map(|section| ConfigTree::new(Value::Object(section.clone())))
            .ok_or_else(|| SqlError::MissingConfiguration(root.to_string()))?;

        let db_type = db
            .get_str("/type")
            .ok_or_else(|| SqlError::MissingType(root.to_string()))?;
        let constructor = self
            .constructors
            .get(db_type)
            .ok_or_else(|| SqlError::UnsupportedType(db_type.to_string()))?;

        let settings = PoolSettings::from_section(&db)?;
        tracing::debug!(root, db_type, max_size = settings.max_size, "Creating database pool");
        constructor(&db, &settings)
    }
}

/// Connection fields shared by the server-based constructors.
#[derive(Debug, Default)]
struct ServerSettings {
    url: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
}

impl ServerSettings {
    fn read(db: &ConfigTree, db_type: &str) -> Result<Self> {
        let port = setting(db, "port")
            .map(|port| {
                port.parse::<u16>()
                    .map_err(|_| invalid_connection(db_type, format!("invalid port '{port}'")))
            })
            .transpose()?;

        Ok(Self {
            url: setting(db, "jdbc-url")
                .or_else(|| setting(db, "jdbcUrl"))
                .or_else(|| setting(db, "url")),
            host: setting(db, "host"),
            port,
            database: setting(db, "database"),
            user: setting(db, "user"),
            password: setting(db, "password"),
        })
    }
}

/// Scalar at `key`, as text. Property files turn numeric passwords into numbers.
fn setting(db: &ConfigTree, key: &str) -> Option<String> {
    match db.get(&format!("/{key}"))? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn invalid_connection(db_type: &str, reason: impl fmt::Display) -> SqlError {
    SqlError::InvalidConnection {
        db_type: db_type.to_string(),
        reason: reason.to_string(),
    }
}

fn postgres_pool(db: &ConfigTree, settings: &PoolSettings) -> Result<SqlPool> {
    let server = ServerSettings::read(db, POSTGRESQL_TYPE)?;
    let mut options = match &server.url {
        Some(url) => PgConnectOptions::from_str(url.trim_start_matches("jdbc:"))
            .map_err(|e| invalid_connection(POSTGRESQL_TYPE, e))?,
        None => PgConnectOptions::new(),
    };
    if let Some(host) = &server.host {
        options = options.host(host);
    }
    if let Some(port) = server.port {
        options = options.port(port);
    }
    if let Some(database) = &server.database {
        options = options.database(database);
    }
    if let Some(user) = &server.user {
        options = options.username(user);
    }
    if let Some(password) = &server.password {
        options = options.password(password);
    }
    Ok(SqlPool::Postgres(settings.options().connect_lazy_with(options)))
}

fn mysql_pool(db: &ConfigTree, settings: &PoolSettings) -> Result<SqlPool> {
    let server = ServerSettings::read(db, MYSQL_TYPE)?;
    let mut options = match &server.url {
        Some(url) => MySqlConnectOptions::from_str(url.trim_start_matches("jdbc:"))
            .map_err(|e| invalid_connection(MYSQL_TYPE, e))?,
        None => MySqlConnectOptions::new(),
    };
    if let Some(host) = &server.host {
        options = options.host(host);
    }
    if let Some(port) = server.port {
        options = options.port(port);
    }
    if let Some(database) = &server.database {
        options = options.database(database);
    }
    if let Some(user) = &server.user {
        options = options.username(user);
    }
    if let Some(password) = &server.password {
        options = options.password(password);
    }
    Ok(SqlPool::MySql(settings.options().connect_lazy_with(options)))
}

fn mssql_pool(db: &ConfigTree, settings: &PoolSettings) -> Result<SqlPool> {
    let server = ServerSettings::read(db, MSSQL_TYPE)?;
    let mut config = match &server.url {
        Some(url) if url.starts_with("jdbc:") => MsSqlConfig::from_jdbc_string(url),
        Some(url) => MsSqlConfig::from_ado_string(url),
        None => Ok(MsSqlConfig::new()),
    }
    .map_err(|e| invalid_connection(MSSQL_TYPE, e))?;

    if let Some(host) = &server.host {
        config.host(host);
    }
    if let Some(port) = server.port {
        config.port(port);
    }
    if let Some(database) = &server.database {
        config.database(database);
    }
    if let Some(user) = &server.user {
        config.authentication(AuthMethod::sql_server(user, server.password.as_deref().unwrap_or_default()));
    }
    if db.get_bool("/trust-server-certificate") || db.get_bool("/trustServerCertificate") {
        config.trust_cert();
    }

    let pool = settings
        .bb8_builder()
        .build_unchecked(ConnectionManager::new(config.clone()));
    Ok(SqlPool::MsSql(MsSqlPool {
        pool,
        config,
        max_size: settings.max_size,
    }))
}

fn jdbc_pool(db: &ConfigTree, settings: &PoolSettings) -> Result<SqlPool> {
    let server = ServerSettings::read(db, JDBC_TYPE)?;
    let url = server
        .url
        .as_deref()
        .ok_or_else(|| invalid_connection(JDBC_TYPE, "missing 'jdbc-url'"))?;
    let options = any_options(url, server.user.as_deref(), server.password.as_deref())
        .map_err(|reason| invalid_connection(JDBC_TYPE, reason))?;

    sqlx::any::install_default_drivers();
    Ok(SqlPool::Any(settings.options().connect_lazy_with(options)))
}

/// Parse a connection URL, adding credentials the URL does not carry.
pub(crate) fn any_options(
    url: &str,
    user: Option<&str>,
    password: Option<&str>,
) -> std::result::Result<AnyConnectOptions, String> {
    let mut options = AnyConnectOptions::from_str(url.trim_start_matches("jdbc:"))
        .map_err(|e| e.to_string())?;

    if let Some(user) = user.filter(|_| options.database_url.username().is_empty()) {
        options
            .database_url
            .set_username(user)
            .map_err(|()| format!("url '{url}' cannot carry a user"))?;
    }
    if let Some(password) = password.filter(|_| options.database_url.password().is_none()) {
        options
            .database_url
            .set_password(Some(password))
            .map_err(|()| format!("url '{url}' cannot carry a password"))?;
    }
    Ok(options)
}
