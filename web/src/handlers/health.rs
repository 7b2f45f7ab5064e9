//! Health check endpoint.
//!
//! Enabled through configuration:
//!
//! ```yaml
//! http:
//!   health:
//!     enabled: true
//!     path: /health   # default
//! ```
//!
//! # Response
//!
//! ```json
//! {
//!   "status": "UP",
//!   "checks": [{ "id": "status", "status": "UP" }],
//!   "outcome": "UP"
//! }
//! ```
//!
//! Any failing check turns the outcome `DOWN` and the status code 503.

use crate::router::{RouterHandler, route_path};
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Json;
use futures::FutureExt;
use futures::future::BoxFuture;
use launchpad_core::ConfigTree;
use launchpad_runtime::Runtime;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// `http.health.enabled`
pub const CONFIG_HEALTH_ENABLED: &str = "/http/health/enabled";
/// `http.health.path`
pub const CONFIG_HEALTH_PATH: &str = "/http/health/path";
/// Path used when `http.health.path` is absent.
pub const DEFAULT_HEALTH_PATH: &str = "/health";

type Check = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Status of one check or of the whole report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Healthy
    Up,
    /// Unhealthy
    Down,
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    /// Check id
    pub id: String,
    /// Outcome
    pub status: Status,
    /// Failure details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Body of the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Overall status
    pub status: Status,
    /// Individual checks, in registration order
    pub checks: Vec<CheckResult>,
    /// Same as `status`
    pub outcome: Status,
}

/// Serves a health report at a fixed path.
///
/// A built-in `status` check always reports `UP`; more can be registered
/// with [`with_check`](Self::with_check).
#[derive(Clone)]
pub struct DefaultHealthCheckHandler {
    path: String,
    checks: Vec<(String, Check)>,
}

impl std::fmt::Debug for DefaultHealthCheckHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultHealthCheckHandler")
            .field("path", &self.path)
            .field("checks", &self.checks.iter().map(|(id, _)| id).collect::<Vec<_>>())
            .finish()
    }
}

impl DefaultHealthCheckHandler {
    /// Serve at `path`; a missing leading `/` is added.
    #[must_use]
    pub fn for_path(path: impl AsRef<str>) -> Self {
        Self {
            path: route_path(path.as_ref()),
            checks: Vec::new(),
        }
    }

    /// Register a check; an `Err` reports it `DOWN` with the error as cause.
    #[must_use]
    pub fn with_check<F, Fut>(mut self, id: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let boxed: Check = Arc::new(move || check().boxed());
        self.checks.push((id.into(), boxed));
        self
    }

    /// Served path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run every check concurrently.
    pub async fn report(&self) -> HealthReport {
        let results = futures::future::join_all(self.checks.iter().map(|(id, check)| {
            let id = id.clone();
            let check = check();
            async move {
                match check.await {
                    Ok(()) => CheckResult {
                        id,
                        status: Status::Up,
                        data: None,
                    },
                    Err(e) => CheckResult {
                        id,
                        status: Status::Down,
                        data: Some(serde_json::json!({ "cause": format!("{e:#}") })),
                    },
                }
            }
        }))
        .await;

        let mut checks = vec![CheckResult {
            id: "status".to_string(),
            status: Status::Up,
            data: None,
        }];
        checks.extend(results);

        let status = if checks.iter().all(|c| c.status == Status::Up) {
            Status::Up
        } else {
            Status::Down
        };
        HealthReport {
            status,
            checks,
            outcome: status,
        }
    }
}

impl RouterHandler for DefaultHealthCheckHandler {
    fn apply(&self, _runtime: &Runtime, router: Router, _config: &ConfigTree) -> Router {
        let handler = self.clone();
        router.route(
            &self.path,
            get(move || {
                let handler = handler.clone();
                async move {
                    let report = handler.report().await;
                    let code = match report.status {
                        Status::Up => StatusCode::OK,
                        Status::Down => {
                            tracing::warn!(checks = ?report.checks, "Health check is down");
                            StatusCode::SERVICE_UNAVAILABLE
                        }
                    };
                    (code, Json(report))
                }
            }),
        )
    }
}

/// Adds the health endpoint when `http.health.enabled` is true.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthCheckHandler;

impl RouterHandler for HealthCheckHandler {
    fn apply(&self, runtime: &Runtime, router: Router, config: &ConfigTree) -> Router {
        if !config.get_bool(CONFIG_HEALTH_ENABLED) {
            return router;
        }
        let path = config.get_str_or(CONFIG_HEALTH_PATH, DEFAULT_HEALTH_PATH);
        tracing::debug!(path, "Health check enabled");
        DefaultHealthCheckHandler::for_path(path).apply(runtime, router, config)
    }
}
