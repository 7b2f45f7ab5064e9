//! Prometheus metrics for bootstrap and HTTP observability.
//!
//! The Prometheus recorder is process-global. [`install_recorder`] installs it
//! on first use and hands out the same [`PrometheusHandle`] afterwards, so
//! several runtimes (or tests) in one process share one registry.
//!
//! # Example
//!
//! ```rust,no_run
//! use launchpad_runtime::metrics::{install_recorder, DeploymentMetrics};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = install_recorder()?;
//! DeploymentMetrics::record_started("HttpServerUnit");
//!
//! println!("{}", handle.render());
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

static RECORDER: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the process-wide Prometheus recorder, or return the existing one.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a recorder that this module did not
/// install is already registered with the `metrics` facade.
pub fn install_recorder() -> Result<PrometheusHandle, MetricsError> {
    let mut recorder = RECORDER.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = recorder.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    register_metrics();
    tracing::info!("Prometheus metrics recorder installed");

    *recorder = Some(handle.clone());
    Ok(handle)
}

/// The installed recorder, if any.
#[must_use]
pub fn recorder_handle() -> Option<PrometheusHandle> {
    RECORDER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn register_metrics() {
    describe_counter!(
        "launchpad_units_deployed_total",
        "Units submitted for deployment, by unit and outcome"
    );
    describe_counter!(
        "http_server_requests_total",
        "HTTP requests handled, by method and status"
    );
    describe_histogram!(
        "http_server_request_duration_seconds",
        "Time taken to handle HTTP requests"
    );
}

/// Deployment metrics recorder.
pub struct DeploymentMetrics;

impl DeploymentMetrics {
    /// Record a unit that started.
    pub fn record_started(unit: &str) {
        counter!("launchpad_units_deployed_total", "unit" => unit.to_string(), "outcome" => "success")
            .increment(1);
    }

    /// Record a unit that failed to start.
    pub fn record_failed(unit: &str) {
        counter!("launchpad_units_deployed_total", "unit" => unit.to_string(), "outcome" => "failure")
            .increment(1);
    }
}

/// HTTP server metrics recorder.
pub struct HttpMetrics;

impl HttpMetrics {
    /// Record a handled request.
    pub fn record_request(method: &str, status: u16, duration: Duration) {
        counter!(
            "http_server_requests_total",
            "method" => method.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        histogram!("http_server_request_duration_seconds", "method" => method.to_string())
            .record(duration.as_secs_f64());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_install_is_reusable() {
        let first = install_recorder().unwrap();
        let second = install_recorder().unwrap();

        DeploymentMetrics::record_started("ReusableUnit");

        assert!(recorder_handle().is_some());
        assert!(first.render().contains("launchpad_units_deployed_total"));
        assert!(second.render().contains("ReusableUnit"));
    }

    #[test]
    fn test_http_metrics_render() {
        let handle = install_recorder().unwrap();
        HttpMetrics::record_request("GET", 200, Duration::from_millis(5));

        let rendered = handle.render();
        assert!(rendered.contains("http_server_requests_total"));
        assert!(rendered.contains("http_server_request_duration_seconds"));
    }
}
