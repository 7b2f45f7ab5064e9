//! Prometheus scrape endpoint.
//!
//! ```yaml
//! metrics:
//!   micrometer:
//!     enabled: true
//!     prometheus:
//!       enabled: true
//!       path: /metrics   # default
//! ```

use crate::router::{RouterHandler, route_path};
use axum::Router;
use axum::http::header::CONTENT_TYPE;
use axum::routing::get;
use launchpad_core::ConfigTree;
use launchpad_runtime::Runtime;
use launchpad_runtime::metrics::recorder_handle;
use metrics_exporter_prometheus::PrometheusHandle;

/// `metrics.micrometer.enabled`
pub const CONFIG_METRICS_ENABLED: &str = "/metrics/micrometer/enabled";
/// `metrics.micrometer.prometheus.enabled`
pub const CONFIG_PROMETHEUS_ENABLED: &str = "/metrics/micrometer/prometheus/enabled";
/// `metrics.micrometer.prometheus.path`
pub const CONFIG_PROMETHEUS_PATH: &str = "/metrics/micrometer/prometheus/path";
/// Path used when `metrics.micrometer.prometheus.path` is absent.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
/// Prometheus text exposition format.
pub const CONTENT_TYPE_PROMETHEUS: &str = "text/plain; version=0.0.4";

/// Adds the scrape endpoint when both metrics flags are set.
///
/// Renders the runtime's recorder, or the process recorder when the
/// runtime was created without metrics. Without any recorder the route is
/// not added.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsHandler;

impl MetricsHandler {
    /// Route serving `handle` at `path`; a missing leading `/` is added.
    #[must_use]
    pub fn route(router: Router, path: &str, handle: PrometheusHandle) -> Router {
        router.route(
            &route_path(path),
            get(move || {
                let body = handle.render();
                async move { ([(CONTENT_TYPE, CONTENT_TYPE_PROMETHEUS)], body) }
            }),
        )
    }
}

impl RouterHandler for MetricsHandler {
    fn apply(&self, runtime: &Runtime, router: Router, config: &ConfigTree) -> Router {
        if !(config.get_bool(CONFIG_METRICS_ENABLED) && config.get_bool(CONFIG_PROMETHEUS_ENABLED)) {
            return router;
        }

        let Some(handle) = runtime.metrics_handle().cloned().or_else(recorder_handle) else {
            tracing::warn!("Prometheus endpoint enabled but no metrics recorder is installed");
            return router;
        };

        let path = config.get_str_or(CONFIG_PROMETHEUS_PATH, DEFAULT_METRICS_PATH);
        tracing::debug!(path, "Prometheus endpoint enabled");
        Self::route(router, path, handle)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use launchpad_runtime::metrics::{DeploymentMetrics, install_recorder};
    use launchpad_runtime::{MetricsOptions, RuntimeOptions};
    use serde_json::json;
    use tower::ServiceExt;

    fn metrics_config(path: Option<&str>) -> ConfigTree {
        let mut prometheus = json!({ "enabled": true });
        if let Some(path) = path {
            prometheus["path"] = json!(path);
        }
        ConfigTree::new(json!({
            "metrics": { "micrometer": { "enabled": true, "prometheus": prometheus } }
        }))
    }

    fn metrics_runtime() -> Runtime {
        Runtime::new(RuntimeOptions::default().with_metrics(MetricsOptions {
            enabled: true,
            prometheus: true,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_scrape_endpoint() {
        let router = MetricsHandler.apply(&metrics_runtime(), Router::new(), &metrics_config(None));
        DeploymentMetrics::record_started("ScrapedUnit");

        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE].to_str().unwrap(),
            CONTENT_TYPE_PROMETHEUS
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("launchpad_units_deployed_total"));
        assert!(text.contains("ScrapedUnit"));
    }

    #[tokio::test]
    async fn test_custom_path_is_rooted() {
        let router = MetricsHandler.apply(
            &metrics_runtime(),
            Router::new(),
            &metrics_config(Some("prometheus")),
        );

        let response = router
            .oneshot(Request::builder().uri("/prometheus").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_prometheus_flag_required() {
        install_recorder().unwrap();
        let config = ConfigTree::new(json!({ "metrics": { "micrometer": { "enabled": true } } }));
        let router = MetricsHandler.apply(&metrics_runtime(), Router::new(), &config);

        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
