//! # Launchpad Testing
//!
//! Fixtures shared by the Launchpad test suites.
//!
//! - [`free_port`]: an unused local TCP port
//! - [`ConfigDir`]: a temporary directory of configuration files
//! - [`MockUnit`], [`FailingUnit`]: deployable units that record their lifecycle
//! - [`RecordingHandler`]: a lifecycle handler that records when it ran
//! - [`jwt`]: fixed RSA keys and token signing
//!
//! ## Example
//!
//! ```
//! use launchpad_testing::{EventLog, MockUnit};
//! use launchpad_runtime::{Runtime, RuntimeOptions};
//!
//! # tokio_test::block_on(async {
//! let log = EventLog::default();
//! let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
//! runtime.deploy(Box::new(MockUnit::new("api", &log))).await.unwrap();
//! runtime.close().await.unwrap();
//!
//! assert_eq!(log.entries(), vec!["start:api", "stop:api"]);
//! # });
//! ```

use futures::FutureExt;
use futures::future::BoxFuture;
use launchpad_core::loader::ConfigurationLoaderBuilder;
use launchpad_core::{ConfigTree, ConfigurationLoader, InitializationContext};
use launchpad_runtime::{Deployable, InitializationHandler, Runtime};
use std::collections::HashMap;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::TempDir;

pub mod jwt;

/// An unused TCP port on the loopback interface.
///
/// # Panics
///
/// Panics if no port can be bound.
#[must_use]
#[allow(clippy::expect_used)]
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("binding an ephemeral port should succeed")
}

/// Temporary directory of configuration files, removed on drop.
#[derive(Debug)]
pub struct ConfigDir {
    dir: TempDir,
}

impl ConfigDir {
    /// Create an empty directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("creating a temporary directory should succeed"),
        }
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `relative`, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    #[allow(clippy::expect_used)]
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("creating config directories should succeed");
        }
        std::fs::write(&path, contents).expect("writing a config file should succeed");
        path
    }

    /// A loader rooted at this directory with an empty environment.
    #[must_use]
    pub fn loader(&self) -> ConfigurationLoaderBuilder {
        ConfigurationLoader::builder()
            .base_dir(self.dir.path())
            .environment(HashMap::<String, String>::new())
    }
}

impl Default for ConfigDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared, ordered record of lifecycle events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    /// Append an entry.
    pub fn push(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    /// Snapshot of every entry.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether `entry` was recorded.
    #[must_use]
    pub fn contains(&self, entry: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|e| e == entry)
    }

    /// Position of `entry`, if recorded.
    #[must_use]
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .position(|e| e == entry)
    }
}

/// Unit that records `start:<name>` and `stop:<name>`.
#[derive(Debug, Clone)]
pub struct MockUnit {
    name: String,
    log: EventLog,
}

impl MockUnit {
    /// A unit named `name` recording into `log`.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &EventLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
        }
    }
}

impl Deployable for MockUnit {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn start<'a>(&'a mut self, _runtime: &'a Runtime) -> BoxFuture<'a, anyhow::Result<()>> {
        async move {
            self.log.push(format!("start:{}", self.name));
            Ok(())
        }
        .boxed()
    }

    fn stop(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
        async move {
            self.log.push(format!("stop:{}", self.name));
            Ok(())
        }
        .boxed()
    }
}

/// Unit whose start always fails with `message`.
#[derive(Debug, Clone)]
pub struct FailingUnit {
    name: String,
    message: String,
}

impl FailingUnit {
    /// A unit named `name` failing with `message`.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl Deployable for FailingUnit {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn start<'a>(&'a mut self, _runtime: &'a Runtime) -> BoxFuture<'a, anyhow::Result<()>> {
        futures::future::ready(Err(anyhow::anyhow!(self.message.clone()))).boxed()
    }
}

/// Handler that records its label, and optionally fails.
#[derive(Debug, Clone)]
pub struct RecordingHandler {
    label: String,
    log: EventLog,
    failure: Option<String>,
}

impl RecordingHandler {
    /// A handler recording `label` into `log`.
    #[must_use]
    pub fn new(label: impl Into<String>, log: &EventLog) -> Self {
        Self {
            label: label.into(),
            log: log.clone(),
            failure: None,
        }
    }

    /// A handler that records `label`, then fails with `message`.
    #[must_use]
    pub fn failing(label: impl Into<String>, log: &EventLog, message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(label, log)
        }
    }
}

impl InitializationHandler for RecordingHandler {
    fn handle(
        &self,
        _runtime: &Runtime,
        _context: &InitializationContext,
        _config: &ConfigTree,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        self.log.push(self.label.clone());
        let result = match &self.failure {
            Some(message) => Err(anyhow::anyhow!(message.clone())),
            None => Ok(()),
        };
        futures::future::ready(result).boxed()
    }
}
