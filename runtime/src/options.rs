//! Runtime options and the configurers that derive them from configuration.

use launchpad_core::ConfigTree;
use std::sync::Arc;
use std::time::Duration;

/// Name of the trace id entry in contextual log data.
pub const TRACE_ID_KEY: &str = "traceId";
/// Name of the span id entry in contextual log data.
pub const SPAN_ID_KEY: &str = "spanId";
/// Name of the parent span id entry in contextual log data.
pub const PARENT_ID_KEY: &str = "parentId";

/// Options a [`Runtime`](crate::Runtime) is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Name used in logs
    pub name: String,
    /// Metrics collection; `None` disables it
    pub metrics: Option<MetricsOptions>,
    /// Distributed tracing; `None` disables it
    pub tracing: Option<TracingOptions>,
    /// How long each unit may take to stop on close
    pub shutdown_timeout: Duration,
}

impl RuntimeOptions {
    /// Set the runtime name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set metrics options.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsOptions) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set tracing options.
    #[must_use]
    pub fn with_tracing(mut self, tracing: TracingOptions) -> Self {
        self.tracing = Some(tracing);
        self
    }

    /// Set the per-unit shutdown timeout.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Whether a metrics recorder should be installed.
    #[must_use]
    pub fn metrics_enabled(&self) -> bool {
        self.metrics.as_ref().is_some_and(|m| m.enabled)
    }
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            name: "launchpad".to_string(),
            metrics: None,
            tracing: None,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Metrics collection options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsOptions {
    /// Install a recorder
    pub enabled: bool,
    /// Expose a Prometheus scrape endpoint
    pub prometheus: bool,
}

/// Distributed tracing backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOptions {
    /// Zipkin-compatible B3 tracing
    Zipkin {
        /// Collector endpoint
        endpoint: Option<String>,
        /// Service name reported with spans
        service_name: Option<String>,
    },
    /// OpenTracing-compatible tracing
    OpenTracing,
}

/// Derives [`RuntimeOptions`] from configuration.
///
/// Implemented for `Fn(RuntimeOptions, &ConfigTree) -> RuntimeOptions`.
pub trait RuntimeOptionsConfigurer: Send + Sync {
    /// Return `options` updated from `config`.
    fn configure(&self, options: RuntimeOptions, config: &ConfigTree) -> RuntimeOptions;
}

impl<F> RuntimeOptionsConfigurer for F
where
    F: Fn(RuntimeOptions, &ConfigTree) -> RuntimeOptions + Send + Sync,
{
    fn configure(&self, options: RuntimeOptions, config: &ConfigTree) -> RuntimeOptions {
        self(options, config)
    }
}

/// Applies several configurers in order, each seeing the previous result.
#[derive(Clone, Default)]
pub struct CompositeOptionsConfigurer {
    configurers: Vec<Arc<dyn RuntimeOptionsConfigurer>>,
}

impl CompositeOptionsConfigurer {
    /// An empty composite, which leaves options unchanged.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a configurer.
    #[must_use]
    pub fn with(mut self, configurer: impl RuntimeOptionsConfigurer + 'static) -> Self {
        self.configurers.push(Arc::new(configurer));
        self
    }

    /// The metrics and tracing configurers.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with(MetricsOptionsConfigurer)
            .with(TracingOptionsConfigurer)
    }
}

impl RuntimeOptionsConfigurer for CompositeOptionsConfigurer {
    fn configure(&self, options: RuntimeOptions, config: &ConfigTree) -> RuntimeOptions {
        self.configurers
            .iter()
            .fold(options, |options, configurer| configurer.configure(options, config))
    }
}

/// Enables metrics from `metrics.micrometer.*`.
///
/// ```json
/// { "metrics": { "micrometer": { "enabled": true, "prometheus": { "enabled": true } } } }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsOptionsConfigurer;

impl RuntimeOptionsConfigurer for MetricsOptionsConfigurer {
    fn configure(&self, options: RuntimeOptions, config: &ConfigTree) -> RuntimeOptions {
        if !config.get_bool("/metrics/micrometer/enabled") {
            return options;
        }
        options.with_metrics(MetricsOptions {
            enabled: true,
            prometheus: config.get_bool("/metrics/micrometer/prometheus/enabled"),
        })
    }
}

/// Enables tracing from `tracing.zipkin.*` or `tracing.opentracing.*`.
///
/// Zipkin takes precedence when both are enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingOptionsConfigurer;

impl RuntimeOptionsConfigurer for TracingOptionsConfigurer {
    fn configure(&self, options: RuntimeOptions, config: &ConfigTree) -> RuntimeOptions {
        if config.get_bool("/tracing/zipkin/enabled") {
            return options.with_tracing(TracingOptions::Zipkin {
                endpoint: config.get_str("/tracing/zipkin/endpoint").map(str::to_string),
                service_name: config
                    .get_str("/tracing/zipkin/serviceName")
                    .map(str::to_string),
            });
        }
        if config.get_bool("/tracing/opentracing/enabled") {
            return options.with_tracing(TracingOptions::OpenTracing);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metrics_disabled_by_default() {
        let options = MetricsOptionsConfigurer.configure(RuntimeOptions::default(), &ConfigTree::empty());
        assert_eq!(options.metrics, None);
        assert!(!options.metrics_enabled());
    }

    #[test]
    fn test_metrics_with_prometheus() {
        let config = ConfigTree::new(json!({
            "metrics": { "micrometer": { "enabled": true, "prometheus": { "enabled": true } } }
        }));
        let options = MetricsOptionsConfigurer.configure(RuntimeOptions::default(), &config);
        assert_eq!(
            options.metrics,
            Some(MetricsOptions {
                enabled: true,
                prometheus: true
            })
        );
    }

    #[test]
    fn test_prometheus_alone_does_not_enable_metrics() {
        let config = ConfigTree::new(json!({
            "metrics": { "micrometer": { "prometheus": { "enabled": true } } }
        }));
        let options = MetricsOptionsConfigurer.configure(RuntimeOptions::default(), &config);
        assert_eq!(options.metrics, None);
    }

    #[test]
    fn test_zipkin_tracing() {
        let config = ConfigTree::new(json!({
            "tracing": {
                "zipkin": { "enabled": true, "endpoint": "http://zipkin:9411/api/v2/spans", "serviceName": "orders" },
                "opentracing": { "enabled": true }
            }
        }));
        let options = TracingOptionsConfigurer.configure(RuntimeOptions::default(), &config);
        assert_eq!(
            options.tracing,
            Some(TracingOptions::Zipkin {
                endpoint: Some("http://zipkin:9411/api/v2/spans".to_string()),
                service_name: Some("orders".to_string()),
            })
        );
    }

    #[test]
    fn test_opentracing() {
        let config = ConfigTree::new(json!({ "tracing": { "opentracing": { "enabled": true } } }));
        let options = TracingOptionsConfigurer.configure(RuntimeOptions::default(), &config);
        assert_eq!(options.tracing, Some(TracingOptions::OpenTracing));
    }

    #[test]
    fn test_composite_applies_in_order() {
        let composite = CompositeOptionsConfigurer::standard()
            .with(|options: RuntimeOptions, _: &ConfigTree| options.with_name("first"))
            .with(|options: RuntimeOptions, config: &ConfigTree| {
                let name = format!("{}-{}", options.name, config.get_str_or("/suffix", "none"));
                options.with_name(name)
            });

        let config = ConfigTree::new(json!({
            "suffix": "second",
            "metrics": { "micrometer": { "enabled": true } }
        }));
        let options = composite.configure(RuntimeOptions::default(), &config);

        assert_eq!(options.name, "first-second");
        assert!(options.metrics_enabled());
        assert_eq!(options.tracing, None);
    }
}
