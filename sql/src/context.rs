//! Adds a configured [`SqlPool`] to the initialization context.

use crate::pool::{DEFAULT_DATABASE_CONFIG_ROOT, PoolRegistry, SqlPool};
use futures::FutureExt;
use futures::future::BoxFuture;
use launchpad_core::{ConfigTree, ContextKey, InitializationContext};
use launchpad_runtime::{InitializationContextConfigurer, Runtime};
use std::sync::Arc;

/// Context key the pool is stored under by default.
pub const SQL_POOL_KEY: &str = "sqlpool";

/// Typed key for the default entry.
pub const SQL_POOL: ContextKey<SqlPool> = ContextKey::new(SQL_POOL_KEY);

/// Creates the pool described by the `database` section and stores it in
/// the context.
///
/// # Example
///
/// ```no_run
/// use launchpad_runtime::Application;
/// use launchpad_sql::{SQL_POOL, SqlPoolContextConfigurer};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let app = Application::builder()
///     .context_configurer(SqlPoolContextConfigurer::instance())
///     .build();
///
/// let context = app.create().await?;
/// let pool = context.context().fetch(&SQL_POOL).expect("configured above");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SqlPoolContextConfigurer {
    key: String,
    root: String,
    registry: Arc<PoolRegistry>,
}

impl SqlPoolContextConfigurer {
    /// Store the pool under `sqlpool`.
    #[must_use]
    pub fn instance() -> Self {
        Self::with_key(SQL_POOL_KEY)
    }

    /// Store the pool under `key`.
    #[must_use]
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            root: DEFAULT_DATABASE_CONFIG_ROOT.to_string(),
            registry: Arc::new(PoolRegistry::default()),
        }
    }

    /// Read the database section at `root` instead of `database`.
    #[must_use]
    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    /// Create pools with `registry`.
    #[must_use]
    pub fn registry(mut self, registry: PoolRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }
}

impl InitializationContextConfigurer for SqlPoolContextConfigurer {
    fn configure(
        &self,
        context: InitializationContext,
        _runtime: &Runtime,
        config: &ConfigTree,
    ) -> BoxFuture<'static, anyhow::Result<InitializationContext>> {
        let created = self.registry.create_at(config, &self.root);
        let key = self.key.clone();
        async move {
            let pool = created?;
            tracing::info!(key = %key, kind = pool.kind(), "Database pool added to initialization context");
            context.add(key, pool);
            Ok(context)
        }
        .boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use launchpad_runtime::RuntimeOptions;
    use serde_json::json;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeOptions::default()).unwrap()
    }

    fn config() -> ConfigTree {
        ConfigTree::new(json!({
            "database": { "type": "postgresql", "host": "localhost", "database": "orders" },
            "archive": { "type": "mysql", "host": "localhost" }
        }))
    }

    #[tokio::test]
    async fn test_pool_added_under_default_key() {
        let context = SqlPoolContextConfigurer::instance()
            .configure(InitializationContext::new(), &runtime(), &config())
            .await
            .unwrap();

        let pool = context.fetch(&SQL_POOL).unwrap();
        assert_eq!(pool.kind(), "postgresql");
    }

    #[tokio::test]
    async fn test_custom_key_and_root() {
        let context = SqlPoolContextConfigurer::with_key("archive-pool")
            .root("archive")
            .configure(InitializationContext::new(), &runtime(), &config())
            .await
            .unwrap();

        assert!(!context.contains(SQL_POOL_KEY));
        assert_eq!(context.get::<SqlPool>("archive-pool").unwrap().kind(), "mysql");
    }

    #[tokio::test]
    async fn test_unsupported_type_fails() {
        let config = ConfigTree::new(json!({ "database": { "type": "oracle" } }));
        let error = SqlPoolContextConfigurer::instance()
            .configure(InitializationContext::new(), &runtime(), &config)
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "Database type 'oracle' is not supported.");
    }
}
