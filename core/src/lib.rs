//! # Launchpad Core
//!
//! Configuration and shared-state primitives for the Launchpad application
//! bootstrap.
//!
//! ## Concepts
//!
//! - **[`ConfigTree`]**: immutable merged configuration, addressed with JSON
//!   pointers (`/http/server/port`)
//! - **[`ConfigurationLoader`]**: reads layered JSON, YAML and properties
//!   stores in a fixed precedence order
//! - **[`InitializationContext`]**: registry of objects (pools, clients)
//!   created by one bootstrap stage and read by later ones
//! - **[`join_all_settled`]**: concurrent fan-out that waits for every task
//!   and reports the first failure deterministically
//!
//! ## Example
//!
//! ```no_run
//! use launchpad_core::{ConfigurationLoader, InitializationContext};
//!
//! # async fn run() -> launchpad_core::Result<()> {
//! let config = ConfigurationLoader::builder()
//!     .add_config_path("conf/local.yml")
//!     .build()
//!     .load()
//!     .await?;
//!
//! let context = InitializationContext::new();
//! context.add("service-name", config.get_str_or("/service/name", "app").to_string());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod error;
pub mod join;
pub mod loader;
pub mod strings;

pub use config::{ConfigTree, merge_deep};
pub use context::{ContextKey, InitializationContext};
pub use error::{Error, Result};
pub use join::{join_all_settled, settle_all};
pub use loader::{ConfigStore, ConfigurationLoader, Feature, Format, VariableSource};
