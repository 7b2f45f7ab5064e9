//! Callbacks that shape the server's router.
//!
//! - [`RouterConfigurer`] builds a sub-router and the prefix to mount it at
//! - [`RouterHandler`] mutates the top-level router: adds routes or layers
//!
//! Both are implemented for closures.

use axum::Router;
use futures::FutureExt;
use futures::future::BoxFuture;
use launchpad_core::ConfigTree;
use launchpad_runtime::Runtime;
use std::future::Future;

/// Builds a sub-router mounted at the returned prefix.
///
/// A prefix of `""` or `"/"` merges the routes into the top level.
pub trait RouterConfigurer: Send + Sync {
    /// Build the sub-router.
    fn configure(&self, config: ConfigTree) -> BoxFuture<'static, anyhow::Result<(String, Router)>>;
}

impl<F, Fut> RouterConfigurer for F
where
    F: Fn(ConfigTree) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<(String, Router)>> + Send + 'static,
{
    fn configure(&self, config: ConfigTree) -> BoxFuture<'static, anyhow::Result<(String, Router)>> {
        self(config).boxed()
    }
}

/// Adds routes or middleware to the top-level router.
pub trait RouterHandler: Send + Sync {
    /// Return the router with this handler's additions.
    fn apply(&self, runtime: &Runtime, router: Router, config: &ConfigTree) -> Router;
}

impl<F> RouterHandler for F
where
    F: Fn(Runtime, Router, ConfigTree) -> Router + Send + Sync,
{
    fn apply(&self, runtime: &Runtime, router: Router, config: &ConfigTree) -> Router {
        self(runtime.clone(), router, config.clone())
    }
}

/// `path` with a leading `/`.
pub(crate) fn route_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Mount `sub` at `prefix`, merging for the root prefix.
pub(crate) fn mount(router: Router, prefix: &str, sub: Router) -> Router {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        router.merge(sub)
    } else {
        router.nest(&route_path(prefix), sub)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    async fn status(router: Router, uri: &str) -> StatusCode {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    fn ping() -> Router {
        Router::new().route("/ping", get(|| async { "pong" }))
    }

    #[tokio::test]
    async fn test_mount_at_root_merges() {
        assert_eq!(status(mount(Router::new(), "/", ping()), "/ping").await, StatusCode::OK);
        assert_eq!(status(mount(Router::new(), "", ping()), "/ping").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_mount_nests_under_prefix() {
        let router = mount(Router::new(), "/api/", ping());
        assert_eq!(status(router.clone(), "/api/ping").await, StatusCode::OK);
        assert_eq!(status(router, "/ping").await, StatusCode::NOT_FOUND);

        let relative = mount(Router::new(), "v1", ping());
        assert_eq!(status(relative, "/v1/ping").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_closure_configurer() {
        let configurer = |config: ConfigTree| async move {
            let prefix = config.get_str_or("/prefix", "/").to_string();
            Ok::<_, anyhow::Error>((prefix, ping()))
        };
        let config = ConfigTree::new(serde_json::json!({ "prefix": "/svc" }));

        let (prefix, router) = configurer.configure(config).await.unwrap();
        assert_eq!(prefix, "/svc");
        assert_eq!(status(mount(Router::new(), &prefix, router), "/svc/ping").await, StatusCode::OK);
    }
}
