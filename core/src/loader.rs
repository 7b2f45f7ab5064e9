//! Layered configuration loading.
//!
//! The loader reads a fixed stack of configuration stores and deep-merges
//! them into one [`ConfigTree`]. In increasing precedence:
//!
//! 1. Default files under the base directory (`application.properties`,
//!    `application.yml`, `application.json`), when [`Feature::ClasspathConfig`]
//!    is enabled (the default).
//! 2. Default stores (`conf/config.json`, then environment variables), when
//!    [`Feature::DefaultStores`] is enabled.
//! 3. Files listed in the `vertx.configuration` loader property.
//! 4. Files listed in the `VERTX_CONFIGURATION` environment variable.
//! 5. Stores registered with [`add_store`](ConfigurationLoaderBuilder::add_store)
//!    or [`add_config_path`](ConfigurationLoaderBuilder::add_config_path),
//!    in registration order.
//!
//! Path lists use `:` as delimiter and may quote entries with `'` or `"`
//! (see [`split_enclosed`]).
//!
//! # Example
//!
//! ```no_run
//! use launchpad_core::loader::{ConfigStore, ConfigurationLoader};
//!
//! # async fn run() -> launchpad_core::Result<()> {
//! let config = ConfigurationLoader::builder()
//!     .base_dir("/etc/my-service")
//!     .add_config_path("overrides.yml")
//!     .add_store(ConfigStore::file("/run/secrets/db.json").optional(true))
//!     .build()
//!     .load()
//!     .await?;
//!
//! let port = config.get_i64_or("/http/server/port", 8080);
//! # Ok(())
//! # }
//! ```

use crate::config::{ConfigTree, merge_deep};
use crate::error::{Error, Result};
use crate::strings::split_enclosed;
use serde_json::{Map, Number, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loader property listing extra configuration files.
pub const CONFIGURATION_PROPERTY: &str = "vertx.configuration";

/// Environment variable listing extra configuration files.
pub const CONFIGURATION_ENV: &str = "VERTX_CONFIGURATION";

/// Loader property that disables the default files when `true`.
pub const CLASSPATH_DISABLED_PROPERTY: &str = "vertx.configuration.classpath.disabled";

/// Environment variable that disables the default files when `true`.
pub const CLASSPATH_DISABLED_ENV: &str = "VERTX_CONFIGURATION_CLASSPATH_DISABLED";

/// Default files, lowest precedence first.
pub const DEFAULT_CONFIG_FILES: [&str; 3] = [
    "application.properties",
    "application.yml",
    "application.json",
];

/// File read by the default stores.
pub const DEFAULT_STORE_FILE: &str = "conf/config.json";

const PATH_DELIMITER: char = ':';
const PATH_ENCLOSING: [char; 2] = ['\'', '"'];
const FILE_SCHEME: &str = "file://";

/// Optional loader behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    /// Read the default `application.*` files. Enabled by default.
    ClasspathConfig,
    /// Read `conf/config.json` and the process environment. Disabled by default.
    DefaultStores,
}

/// Serialization format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// JSON document
    Json,
    /// YAML document
    Yaml,
    /// Java-style `key=value` properties
    Properties,
}

impl Format {
    /// Infer the format from a file extension (case-insensitive).
    ///
    /// `.yml`/`.yaml` map to YAML, `.properties` to properties, anything else
    /// to JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("yml" | "yaml") => Self::Yaml,
            Some("properties") => Self::Properties,
            _ => Self::Json,
        }
    }

    /// Lower-case format name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Properties => "properties",
        }
    }

    fn parse(self, path: &Path, text: &str) -> Result<Value> {
        let parse_error = |reason: String| Error::Parse {
            path: path.to_path_buf(),
            format: self.name(),
            reason,
        };

        if text.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }

        let value = match self {
            Self::Json => serde_json::from_str(text).map_err(|e| parse_error(e.to_string()))?,
            Self::Yaml => serde_yaml::from_str(text).map_err(|e| parse_error(e.to_string()))?,
            Self::Properties => {
                let entries = java_properties::read(text.as_bytes())
                    .map_err(|e| parse_error(e.to_string()))?;
                Value::Object(
                    entries
                        .into_iter()
                        .map(|(key, value)| (key, coerce_scalar(&value)))
                        .collect(),
                )
            }
        };

        match value {
            Value::Object(_) => Ok(value),
            Value::Null => Ok(Value::Object(Map::new())),
            other => Err(parse_error(format!(
                "expected an object at the document root, found {}",
                json_type(&other)
            ))),
        }
    }
}

/// Read access to environment variables.
///
/// The loader never reads the process environment directly so tests can
/// supply variables without mutating global state.
pub trait VariableSource: Send + Sync {
    /// Value of variable `key`.
    fn var(&self, key: &str) -> Option<String>;

    /// Every variable.
    fn vars(&self) -> Vec<(String, String)>;
}

/// The current process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl VariableSource for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn vars(&self) -> Vec<(String, String)> {
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    }
}

impl VariableSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// One configuration source.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigStore {
    kind: StoreKind,
    optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum StoreKind {
    File {
        path: PathBuf,
        format: Option<Format>,
    },
    Json(Value),
    Environment,
}

impl ConfigStore {
    /// A file store. Required unless marked [`optional`](Self::optional);
    /// the format is inferred from the extension unless set explicitly.
    ///
    /// A `file://` prefix is stripped. Relative paths resolve against the
    /// loader's base directory.
    #[must_use]
    pub fn file(path: impl AsRef<str>) -> Self {
        let path = path.as_ref();
        let path = path.strip_prefix(FILE_SCHEME).unwrap_or(path);
        Self {
            kind: StoreKind::File {
                path: PathBuf::from(path),
                format: None,
            },
            optional: false,
        }
    }

    /// An in-memory document.
    #[must_use]
    pub const fn json(value: Value) -> Self {
        Self {
            kind: StoreKind::Json(value),
            optional: false,
        }
    }

    /// Environment variables as flat top-level keys.
    #[must_use]
    pub const fn environment() -> Self {
        Self {
            kind: StoreKind::Environment,
            optional: false,
        }
    }

    /// Whether a missing source is skipped instead of failing the load.
    #[must_use]
    pub const fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Override the inferred file format. Ignored for non-file stores.
    #[must_use]
    pub fn format(mut self, format: Format) -> Self {
        if let StoreKind::File { format: f, .. } = &mut self.kind {
            *f = Some(format);
        }
        self
    }

    /// Path of a file store.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.kind {
            StoreKind::File { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Whether the store may be missing.
    #[must_use]
    pub const fn is_optional(&self) -> bool {
        self.optional
    }

    fn describe(&self) -> String {
        match &self.kind {
            StoreKind::File { path, .. } => path.display().to_string(),
            StoreKind::Json(_) => "json".to_string(),
            StoreKind::Environment => "environment".to_string(),
        }
    }
}

/// Builds a [`ConfigTree`] from layered stores.
///
/// Cheap to clone. Loading never mutates the loader.
#[derive(Clone)]
pub struct ConfigurationLoader {
    features: BTreeSet<Feature>,
    base_dir: PathBuf,
    properties: HashMap<String, String>,
    environment: Arc<dyn VariableSource>,
    stores: Vec<ConfigStore>,
}

impl ConfigurationLoader {
    /// Start building a loader.
    #[must_use]
    pub fn builder() -> ConfigurationLoaderBuilder {
        ConfigurationLoaderBuilder::new()
    }

    /// Whether `feature` is enabled.
    #[must_use]
    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Every store the loader will read, lowest precedence first.
    #[must_use]
    pub fn stores(&self) -> Vec<ConfigStore> {
        let mut stores = Vec::new();

        if self.is_enabled(Feature::ClasspathConfig) && !self.classpath_disabled() {
            stores.extend(
                DEFAULT_CONFIG_FILES
                    .iter()
                    .map(|name| ConfigStore::file(name).optional(true)),
            );
        }

        if self.is_enabled(Feature::DefaultStores) {
            stores.push(ConfigStore::file(DEFAULT_STORE_FILE).optional(true));
            stores.push(ConfigStore::environment());
        }

        let property_paths = self.properties.get(CONFIGURATION_PROPERTY).map(String::as_str);
        stores.extend(path_list(property_paths));

        let env_paths = self.environment.var(CONFIGURATION_ENV);
        stores.extend(path_list(env_paths.as_deref()));

        stores.extend(self.stores.iter().cloned());
        stores
    }

    /// Read and merge every store.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingSource`] if a required file does not exist
    /// - [`Error::Io`] if a file exists but cannot be read
    /// - [`Error::Parse`] if a file is not valid in its format, or its root
    ///   is not an object
    pub async fn load(&self) -> Result<ConfigTree> {
        let mut root = Value::Object(Map::new());

        for store in self.stores() {
            if let Some(value) = self.read(&store).await? {
                tracing::debug!(store = %store.describe(), "Configuration store loaded");
                merge_deep(&mut root, value);
            }
        }

        Ok(ConfigTree::new(root))
    }

    async fn read(&self, store: &ConfigStore) -> Result<Option<Value>> {
        match &store.kind {
            StoreKind::Json(value) => Ok(Some(value.clone())),
            StoreKind::Environment => Ok(Some(Value::Object(
                self.environment
                    .vars()
                    .into_iter()
                    .map(|(key, value)| (key, coerce_scalar(&value)))
                    .collect(),
            ))),
            StoreKind::File { path, format } => {
                let resolved = self.base_dir.join(path);
                let text = match tokio::fs::read_to_string(&resolved).await {
                    Ok(text) => text,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        if store.optional {
                            tracing::debug!(
                                path = %resolved.display(),
                                "Optional configuration file not found, skipping"
                            );
                            return Ok(None);
                        }
                        return Err(Error::MissingSource(resolved));
                    }
                    Err(source) => {
                        return Err(Error::Io {
                            path: resolved,
                            source,
                        });
                    }
                };
                let format = (*format).unwrap_or_else(|| Format::from_path(path));
                format.parse(&resolved, &text).map(Some)
            }
        }
    }

    fn classpath_disabled(&self) -> bool {
        let property = self
            .properties
            .get(CLASSPATH_DISABLED_PROPERTY)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let env = self
            .environment
            .var(CLASSPATH_DISABLED_ENV)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        property || env
    }
}

impl Default for ConfigurationLoader {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for ConfigurationLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationLoader")
            .field("features", &self.features)
            .field("base_dir", &self.base_dir)
            .field("properties", &self.properties)
            .field("stores", &self.stores)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConfigurationLoader`].
pub struct ConfigurationLoaderBuilder {
    features: BTreeSet<Feature>,
    base_dir: PathBuf,
    properties: HashMap<String, String>,
    environment: Arc<dyn VariableSource>,
    stores: Vec<ConfigStore>,
}

impl ConfigurationLoaderBuilder {
    fn new() -> Self {
        Self {
            features: BTreeSet::from([Feature::ClasspathConfig]),
            base_dir: PathBuf::from("."),
            properties: HashMap::new(),
            environment: Arc::new(ProcessEnvironment),
            stores: Vec::new(),
        }
    }

    /// Enable an optional behaviour.
    #[must_use]
    pub fn enable_feature(mut self, feature: Feature) -> Self {
        self.features.insert(feature);
        self
    }

    /// Disable an optional behaviour.
    #[must_use]
    pub fn disable_feature(mut self, feature: Feature) -> Self {
        self.features.remove(&feature);
        self
    }

    /// Directory relative paths resolve against (default `.`).
    #[must_use]
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Set a loader property, such as [`CONFIGURATION_PROPERTY`].
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Replace the environment variable source.
    #[must_use]
    pub fn environment(mut self, source: impl VariableSource + 'static) -> Self {
        self.environment = Arc::new(source);
        self
    }

    /// Register a store with the highest precedence so far.
    #[must_use]
    pub fn add_store(mut self, store: ConfigStore) -> Self {
        tracing::debug!(store = %store.describe(), "Configuration store added");
        self.stores.push(store);
        self
    }

    /// Register an optional file store.
    #[must_use]
    pub fn add_config_path(self, path: impl AsRef<str>) -> Self {
        self.add_store(ConfigStore::file(path).optional(true))
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> ConfigurationLoader {
        ConfigurationLoader {
            features: self.features,
            base_dir: self.base_dir,
            properties: self.properties,
            environment: self.environment,
            stores: self.stores,
        }
    }
}

fn path_list(paths: Option<&str>) -> Vec<ConfigStore> {
    split_enclosed(paths, PATH_DELIMITER, &PATH_ENCLOSING)
        .into_iter()
        .filter(|path| !path.trim().is_empty())
        .map(|path| ConfigStore::file(path).optional(true))
        .collect()
}

/// Typed JSON value for a flat string: booleans, integers and finite floats
/// are converted, anything else stays a string.
fn coerce_scalar(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed == "true" {
        return Value::Bool(true);
    }
    if trimmed == "false" {
        return Value::Bool(false);
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if trimmed.contains(['.', 'e', 'E']) {
        if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
