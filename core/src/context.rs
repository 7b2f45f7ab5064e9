//! Cross-stage object registry built during bootstrap.
//!
//! Context configurers populate the [`InitializationContext`] before units are
//! deployed; unit configurers read it back. Lookups are type-checked: asking
//! for the wrong type returns `None` rather than a bad cast.
//!
//! ```
//! use launchpad_core::context::{ContextKey, InitializationContext};
//!
//! struct Pool(&'static str);
//!
//! const POOL: ContextKey<Pool> = ContextKey::new("sqlpool");
//!
//! let context = InitializationContext::new();
//! context.insert(&POOL, Pool("primary"));
//!
//! assert_eq!(context.fetch(&POOL).map(|p| p.0), Some("primary"));
//! assert!(context.get::<String>("sqlpool").is_none());
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

type Entries = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// String-keyed registry of shared objects.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone, Default)]
pub struct InitializationContext {
    entries: Arc<RwLock<Entries>>,
}

impl InitializationContext {
    /// An empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn add<T>(&self, key: impl Into<String>, value: T) -> &Self
    where
        T: Any + Send + Sync,
    {
        self.add_shared(key, Arc::new(value))
    }

    /// Store an already shared `value` under `key`.
    pub fn add_shared<T>(&self, key: impl Into<String>, value: Arc<T>) -> &Self
    where
        T: Any + Send + Sync,
    {
        let key = key.into();
        let replaced = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), value)
            .is_some();
        if replaced {
            tracing::debug!(key = %key, "Initialization context entry replaced");
        }
        self
    }

    /// Value under `key`, if present and of type `T`.
    #[must_use]
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let entry = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()?;
        entry.downcast::<T>().ok()
    }

    /// Whether anything is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Remove and return the entry under `key`, if it has type `T`.
    pub fn remove<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !entries.get(key).is_some_and(|entry| entry.is::<T>()) {
            return None;
        }
        entries.remove(key)?.downcast::<T>().ok()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the context holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Store `value` under a typed key.
    pub fn insert<T>(&self, key: &ContextKey<T>, value: T) -> &Self
    where
        T: Any + Send + Sync,
    {
        self.add(key.name, value)
    }

    /// Value under a typed key.
    #[must_use]
    pub fn fetch<T>(&self, key: &ContextKey<T>) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.get(key.name)
    }
}

impl fmt::Debug for InitializationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializationContext")
            .field("keys", &self.keys())
            .finish()
    }
}

/// Name of a context entry together with the type stored under it.
pub struct ContextKey<T> {
    name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    /// Key for entries named `name`.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _type: PhantomData,
        }
    }

    /// Entry name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextKey").field(&self.name).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Client {
        url: String,
    }

    #[test]
    fn test_add_and_get() {
        let context = InitializationContext::new();
        context.add("answer", 42_u32).add("name", "svc".to_string());

        assert_eq!(*context.get::<u32>("answer").unwrap(), 42);
        assert_eq!(context.get::<String>("name").unwrap().as_str(), "svc");
        assert_eq!(context.len(), 2);
        assert_eq!(context.keys(), vec!["answer", "name"]);
    }

    #[test]
    fn test_absent_key_is_none() {
        let context = InitializationContext::new();
        assert!(context.get::<u32>("missing").is_none());
        assert!(!context.contains("missing"));
        assert!(context.is_empty());
    }

    #[test]
    fn test_wrong_type_is_none() {
        let context = InitializationContext::new();
        context.add("answer", 42_u32);
        assert!(context.get::<i64>("answer").is_none());
        assert!(context.contains("answer"));
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let context = InitializationContext::new();
        context.add("k", 1_u8).add("k", "two".to_string());
        assert!(context.get::<u8>("k").is_none());
        assert_eq!(context.get::<String>("k").unwrap().as_str(), "two");
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn test_clones_share_entries() {
        let context = InitializationContext::new();
        let clone = context.clone();
        clone.add("shared", true);
        assert!(*context.get::<bool>("shared").unwrap());
    }

    #[test]
    fn test_typed_keys() {
        const CLIENT: ContextKey<Client> = ContextKey::new("client");

        let context = InitializationContext::new();
        context.insert(
            &CLIENT,
            Client {
                url: "http://localhost".to_string(),
            },
        );

        assert_eq!(context.fetch(&CLIENT).unwrap().url, "http://localhost");
        assert_eq!(CLIENT.name(), "client");
    }

    #[test]
    fn test_remove_checks_type() {
        let context = InitializationContext::new();
        context.add("n", 7_i32);
        assert!(context.remove::<String>("n").is_none());
        assert_eq!(*context.remove::<i32>("n").unwrap(), 7);
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let context = InitializationContext::new();
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let context = context.clone();
                tokio::spawn(async move {
                    context.add(format!("key-{i}"), i);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(context.len(), 16);
    }
}
