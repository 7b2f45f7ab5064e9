//! # Launchpad SQL
//!
//! Configuration-driven SQL pools and database migrations.
//!
//! - **[`PoolRegistry`]**: maps `database.type` to a pool constructor;
//!   built-ins are `postgresql`, `mysql`, `mssql` and `jdbc`
//! - **[`SqlPoolContextConfigurer`]**: creates the pool during bootstrap
//!   and stores it in the initialization context under `sqlpool`
//! - **[`DatabaseMigrationHandler`]**: runs the migration selected by
//!   `database.migration.type` as a pre-deployment handler
//!
//! ## Example
//!
//! ```no_run
//! use launchpad_runtime::Application;
//! use launchpad_sql::{DatabaseMigrationHandler, SqlPoolContextConfigurer};
//!
//! let app = Application::builder()
//!     .context_configurer(SqlPoolContextConfigurer::instance())
//!     .pre_handler(DatabaseMigrationHandler::instance())
//!     .build();
//! ```

#![forbid(unsafe_code)]

pub mod context;
pub mod error;
pub mod migration;
pub mod pool;

pub use context::{SQL_POOL, SQL_POOL_KEY, SqlPoolContextConfigurer};
pub use error::{Result, SqlError};
pub use migration::{DatabaseMigration, DatabaseMigrationHandler, SqlxMigration};
pub use pool::{MsSqlPool, PoolRegistry, PoolSettings, SqlPool};
