//! Immutable, pointer-addressed configuration tree.
//!
//! A [`ConfigTree`] is the merged result of every configuration source the
//! [`ConfigurationLoader`](crate::loader::ConfigurationLoader) reads. It is cheap
//! to clone and shared by reference with every bootstrap stage.
//!
//! Values are addressed with RFC 6901 JSON pointers:
//!
//! ```
//! use launchpad_core::ConfigTree;
//! use serde_json::json;
//!
//! let config = ConfigTree::new(json!({ "http": { "server": { "port": 9090 } } }));
//! assert_eq!(config.get_i64_or("/http/server/port", 8080), 9090);
//! assert_eq!(config.get_str_or("/http/health/path", "/health"), "/health");
//! assert!(!config.get_bool("/http/health/enabled"));
//! ```

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Hierarchical configuration document.
#[derive(Clone, PartialEq)]
pub struct ConfigTree {
    root: Arc<Value>,
}

impl ConfigTree {
    /// Wrap a JSON value.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            root: Arc::new(value),
        }
    }

    /// An empty object.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Value::Object(Map::new()))
    }

    /// The underlying document.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Value at `pointer`, if any.
    #[must_use]
    pub fn get(&self, pointer: &str) -> Option<&Value> {
        self.root.pointer(pointer)
    }

    /// Boolean at `pointer`; absent or non-boolean values read as `false`.
    #[must_use]
    pub fn get_bool(&self, pointer: &str) -> bool {
        self.get_bool_or(pointer, false)
    }

    /// Boolean at `pointer`, or `default`.
    #[must_use]
    pub fn get_bool_or(&self, pointer: &str, default: bool) -> bool {
        self.get(pointer).and_then(Value::as_bool).unwrap_or(default)
    }

    /// String at `pointer`.
    #[must_use]
    pub fn get_str(&self, pointer: &str) -> Option<&str> {
        self.get(pointer).and_then(Value::as_str)
    }

    /// String at `pointer`, or `default`.
    #[must_use]
    pub fn get_str_or<'a>(&'a self, pointer: &str, default: &'a str) -> &'a str {
        self.get_str(pointer).unwrap_or(default)
    }

    /// Integer at `pointer`. Floating point values are truncated.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn get_i64(&self, pointer: &str) -> Option<i64> {
        let value = self.get(pointer)?;
        value
            .as_i64()
            .or_else(|| value.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| value.as_f64().map(|f| f as i64))
    }

    /// Integer at `pointer`, or `default`.
    #[must_use]
    pub fn get_i64_or(&self, pointer: &str, default: i64) -> i64 {
        self.get_i64(pointer).unwrap_or(default)
    }

    /// Object at `pointer`.
    #[must_use]
    pub fn get_object(&self, pointer: &str) -> Option<&Map<String, Value>> {
        self.get(pointer).and_then(Value::as_object)
    }

    /// Array at `pointer`.
    #[must_use]
    pub fn get_array(&self, pointer: &str) -> Option<&Vec<Value>> {
        self.get(pointer).and_then(Value::as_array)
    }

    /// Sub-tree at `pointer` as its own [`ConfigTree`].
    #[must_use]
    pub fn section(&self, pointer: &str) -> Option<Self> {
        self.get(pointer).cloned().map(Self::new)
    }

    /// Deserialize the value at `pointer` into `T`.
    ///
    /// Returns `Ok(None)` when nothing is configured at `pointer`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if the value does not match `T`.
    pub fn deserialize_at<T: DeserializeOwned>(&self, pointer: &str) -> Result<Option<T>> {
        match self.get(pointer) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::deserialize(value)
                .map(Some)
                .map_err(|e| Error::InvalidValue {
                    pointer: pointer.to_string(),
                    reason: e.to_string(),
                }),
        }
    }
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for ConfigTree {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for ConfigTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigTree({})", self.root)
    }
}

impl fmt::Display for ConfigTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.root, f)
    }
}

/// Merge `source` into `target`.
///
/// Objects merge key by key, recursively. Any other node in `source`
/// (scalars, arrays, null) replaces the node in `target`.
pub fn merge_deep(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => merge_deep(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn sample() -> ConfigTree {
        ConfigTree::new(json!({
            "http": { "server": { "port": 9090 }, "health": { "enabled": true } },
            "ratio": 2.75,
            "clients": [{ "issuer": "foo" }]
        }))
    }

    #[test]
    fn test_typed_accessors() {
        let config = sample();
        assert_eq!(config.get_i64("/http/server/port"), Some(9090));
        assert!(config.get_bool("/http/health/enabled"));
        assert_eq!(config.get_str("/clients/0/issuer"), Some("foo"));
        assert_eq!(config.get_array("/clients").map(Vec::len), Some(1));
    }

    #[test]
    fn test_defaults_when_absent() {
        let config = ConfigTree::empty();
        assert!(!config.get_bool("/http/health/enabled"));
        assert!(config.get_bool_or("/missing", true));
        assert_eq!(config.get_i64_or("/http/server/port", 8080), 8080);
        assert_eq!(config.get_str_or("/http/health/path", "/health"), "/health");
        assert!(config.section("/database").is_none());
    }

    #[test]
    fn test_float_truncates_to_integer() {
        assert_eq!(sample().get_i64("/ratio"), Some(2));
    }

    #[test]
    fn test_wrong_type_reads_as_default() {
        let config = ConfigTree::new(json!({ "flag": "yes" }));
        assert!(!config.get_bool("/flag"));
        assert_eq!(config.get_i64("/flag"), None);
    }

    #[test]
    fn test_deserialize_at() {
        #[derive(Deserialize)]
        struct Server {
            port: u16,
        }

        let config = sample();
        let server: Server = config.deserialize_at("/http/server").unwrap().unwrap();
        assert_eq!(server.port, 9090);
        assert!(config.deserialize_at::<Server>("/nope").unwrap().is_none());
        assert!(matches!(
            config.deserialize_at::<Server>("/http/health"),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_merge_deep_overrides_leaves() {
        let mut target = json!({ "a": 1, "b": { "c": 1, "d": 2 }, "list": [1, 2] });
        merge_deep(
            &mut target,
            json!({ "b": { "c": 10, "e": 3 }, "list": [3], "z": true }),
        );
        assert_eq!(
            target,
            json!({ "a": 1, "b": { "c": 10, "d": 2, "e": 3 }, "list": [3], "z": true })
        );
    }

    #[test]
    fn test_merge_scalar_replaces_object() {
        let mut target = json!({ "a": { "b": 1 } });
        merge_deep(&mut target, json!({ "a": "flat" }));
        assert_eq!(target, json!({ "a": "flat" }));
    }
}
