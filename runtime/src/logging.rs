//! Logging initialisation from configuration.
//!
//! ```json
//! { "logging": { "level": "info,launchpad_web=debug", "format": "json" } }
//! ```
//!
//! `RUST_LOG`, when set, overrides `logging.level`. JSON output includes the
//! fields of the current span, so request-scoped fields such as `trace_id`
//! appear on every line logged while handling a request.

use crate::handler::InitializationHandler;
use crate::runtime::Runtime;
use futures::FutureExt;
use futures::future::BoxFuture;
use launchpad_core::{ConfigTree, InitializationContext};
use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Errors from logging initialisation.
#[derive(Error, Debug)]
pub enum LoggingError {
    /// `logging` section has the wrong shape
    #[error("Invalid logging configuration")]
    Config(#[from] launchpad_core::Error),

    /// The level directive could not be parsed
    #[error("Invalid log filter '{directive}': {reason}")]
    Filter {
        /// Directive as configured
        directive: String,
        /// Parser message
        reason: String,
    },
}

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// The `logging` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, `EnvFilter` syntax
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    /// Read the `logging` section, defaulting when absent.
    ///
    /// # Errors
    ///
    /// Returns [`LoggingError::Config`] if the section has the wrong shape.
    pub fn from_config(config: &ConfigTree) -> Result<Self, LoggingError> {
        Ok(config.deserialize_at("/logging")?.unwrap_or_default())
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|e| LoggingError::Filter {
            directive: self.level.clone(),
            reason: e.to_string(),
        })
    }
}

/// Install the global subscriber described by `config`.
///
/// A subscriber that is already installed is left in place.
///
/// # Errors
///
/// Returns [`LoggingError`] if the configuration is invalid.
pub fn init(config: &ConfigTree) -> Result<(), LoggingError> {
    let logging = LoggingConfig::from_config(config)?;
    let filter = logging.filter()?;

    let installed = match logging.format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(false)
            .try_init(),
    };

    match installed {
        Ok(()) => tracing::debug!(level = %logging.level, format = ?logging.format, "Logging initialized"),
        Err(e) => tracing::debug!(error = %e, "Logging already initialized, keeping existing subscriber"),
    }
    Ok(())
}

/// Pre-deployment handler that calls [`init`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl InitializationHandler for LoggingHandler {
    fn handle(
        &self,
        _runtime: &Runtime,
        _context: &InitializationContext,
        config: &ConfigTree,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        futures::future::ready(init(config).map_err(anyhow::Error::from)).boxed()
    }
}
