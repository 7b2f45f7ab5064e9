//! The runtime instance that hosts deployed units.
//!
//! A [`Runtime`] does not own an executor: units run on the caller's tokio
//! runtime. It tracks which units are deployed, broadcasts the shutdown
//! signal and stops units in reverse deployment order on [`Runtime::close`].

use crate::error::RuntimeError;
use crate::metrics;
use crate::options::RuntimeOptions;
use futures::future::BoxFuture;
use metrics_exporter_prometheus::PrometheusHandle;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, watch};
use uuid::Uuid;

/// Identifier of one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeploymentId(Uuid);

impl DeploymentId {
    /// A fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeploymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A unit of application logic started and stopped by the [`Runtime`].
///
/// # Example
///
/// ```
/// use futures::future::BoxFuture;
/// use futures::FutureExt;
/// use launchpad_runtime::{Deployable, Runtime};
///
/// struct Ticker;
///
/// impl Deployable for Ticker {
///     fn start<'a>(&'a mut self, runtime: &'a Runtime) -> BoxFuture<'a, anyhow::Result<()>> {
///         let shutdown = runtime.shutdown_signal();
///         async move {
///             tokio::spawn(async move {
///                 shutdown.await;
///             });
///             Ok(())
///         }
///         .boxed()
///     }
/// }
///
/// assert_eq!(Ticker.name(), "Ticker");
/// ```
pub trait Deployable: Send {
    /// Name used in logs and deployment results.
    ///
    /// Defaults to the implementation's type name without module path or
    /// generic arguments.
    fn name(&self) -> String {
        simple_type_name(std::any::type_name::<Self>()).to_string()
    }

    /// Start the unit. The unit counts as deployed once this resolves `Ok`.
    fn start<'a>(&'a mut self, runtime: &'a Runtime) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Stop the unit.
    fn stop(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// `crate::module::Type<Generic>` becomes `Type`.
#[must_use]
pub fn simple_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

struct Deployment {
    id: DeploymentId,
    name: String,
    unit: Box<dyn Deployable>,
}

struct Inner {
    options: RuntimeOptions,
    deployments: Mutex<Vec<Deployment>>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
    metrics: Option<PrometheusHandle>,
}

/// Handle to a runtime instance.
///
/// Cheap to clone; clones refer to the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<Inner>,
}

impl Runtime {
    /// Create a runtime.
    ///
    /// Installs the Prometheus recorder when metrics are enabled.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Metrics`] if the recorder cannot be installed.
    pub fn new(options: RuntimeOptions) -> Result<Self, RuntimeError> {
        let metrics = if options.metrics_enabled() {
            Some(metrics::install_recorder().map_err(|e| RuntimeError::Metrics(e.to_string()))?)
        } else {
            None
        };

        if let Some(tracing) = &options.tracing {
            tracing::info!(runtime = %options.name, tracing = ?tracing, "Tracing enabled");
        }
        tracing::debug!(runtime = %options.name, metrics = metrics.is_some(), "Runtime created");

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(Inner {
                options,
                deployments: Mutex::new(Vec::new()),
                shutdown,
                closed: AtomicBool::new(false),
                metrics,
            }),
        })
    }

    /// Options the runtime was created with.
    #[must_use]
    pub fn options(&self) -> &RuntimeOptions {
        &self.inner.options
    }

    /// Prometheus handle, when metrics are enabled.
    #[must_use]
    pub fn metrics_handle(&self) -> Option<&PrometheusHandle> {
        self.inner.metrics.as_ref()
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Resolves once the runtime starts closing.
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.inner.shutdown.subscribe();
        async move {
            // A dropped sender means the runtime is gone, which also ends the wait.
            let _ = receiver.wait_for(|closed| *closed).await;
        }
    }

    /// Start `unit` and register it.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Closed`] if the runtime is closed
    /// - [`RuntimeError::StartFailed`] if the unit fails to start
    pub async fn deploy(&self, mut unit: Box<dyn Deployable>) -> Result<DeploymentId, RuntimeError> {
        if self.is_closed() {
            return Err(RuntimeError::Closed);
        }

        let name = unit.name();
        unit.start(self)
            .await
            .map_err(|source| RuntimeError::StartFailed {
                name: name.clone(),
                source,
            })?;

        let id = DeploymentId::new();
        self.inner.deployments.lock().await.push(Deployment {
            id,
            name,
            unit,
        });
        Ok(id)
    }

    /// Deployed units, in deployment order.
    pub async fn deployments(&self) -> Vec<(DeploymentId, String)> {
        self.inner
            .deployments
            .lock()
            .await
            .iter()
            .map(|d| (d.id, d.name.clone()))
            .collect()
    }

    /// Signal shutdown and stop every unit, most recently deployed first.
    ///
    /// Calling this more than once is a no-op. Stop failures are logged.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ShutdownTimeout`] naming the units that did not
    /// stop within the configured timeout. Every unit is still asked to stop.
    pub async fn close(&self) -> Result<(), RuntimeError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        tracing::info!(runtime = %self.inner.options.name, "Closing runtime");
        self.inner.shutdown.send_replace(true);

        let deployments = std::mem::take(&mut *self.inner.deployments.lock().await);
        let timeout = self.inner.options.shutdown_timeout;
        let mut timed_out = Vec::new();

        for mut deployment in deployments.into_iter().rev() {
            match tokio::time::timeout(timeout, deployment.unit.stop()).await {
                Ok(Ok(())) => {
                    tracing::debug!(unit = %deployment.name, id = %deployment.id, "Unit stopped");
                }
                Ok(Err(e)) => {
                    tracing::error!(unit = %deployment.name, error = %format_args!("{e:#}"), "Stopping unit '{}' failed", deployment.name);
                }
                Err(_) => {
                    tracing::error!(unit = %deployment.name, ?timeout, "Stopping unit '{}' timed out", deployment.name);
                    timed_out.push(deployment.name);
                }
            }
        }

        if timed_out.is_empty() {
            Ok(())
        } else {
            Err(RuntimeError::ShutdownTimeout(timed_out))
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("options", &self.inner.options)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    type Log = Arc<StdMutex<Vec<String>>>;

    struct Recorded {
        label: &'static str,
        log: Log,
        fail_start: bool,
        stop_delay: Duration,
    }

    impl Recorded {
        fn new(label: &'static str, log: &Log) -> Self {
            Self {
                label,
                log: Arc::clone(log),
                fail_start: false,
                stop_delay: Duration::ZERO,
            }
        }
    }

    impl Deployable for Recorded {
        fn name(&self) -> String {
            self.label.to_string()
        }

        fn start<'a>(&'a mut self, _runtime: &'a Runtime) -> BoxFuture<'a, anyhow::Result<()>> {
            async move {
                if self.fail_start {
                    anyhow::bail!("{} refused to start", self.label);
                }
                self.log.lock().unwrap().push(format!("start:{}", self.label));
                Ok(())
            }
            .boxed()
        }

        fn stop(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
            async move {
                tokio::time::sleep(self.stop_delay).await;
                self.log.lock().unwrap().push(format!("stop:{}", self.label));
                Ok(())
            }
            .boxed()
        }
    }

    struct Plain;

    impl Deployable for Plain {
        fn start<'a>(&'a mut self, _runtime: &'a Runtime) -> BoxFuture<'a, anyhow::Result<()>> {
            async { Ok(()) }.boxed()
        }
    }

    #[test]
    fn test_simple_type_name() {
        assert_eq!(simple_type_name("a::b::HttpServerUnit"), "HttpServerUnit");
        assert_eq!(simple_type_name("a::Wrapper<b::Inner>"), "Wrapper");
        assert_eq!(simple_type_name("Plain"), "Plain");
        assert_eq!(Plain.name(), "Plain");
    }

    #[tokio::test]
    async fn test_deploy_and_close_in_reverse_order() {
        let log = Log::default();
        let runtime = Runtime::new(RuntimeOptions::default()).unwrap();

        runtime.deploy(Box::new(Recorded::new("a", &log))).await.unwrap();
        runtime.deploy(Box::new(Recorded::new("b", &log))).await.unwrap();

        let names: Vec<_> = runtime.deployments().await.into_iter().map(|(_, n)| n).collect();
        assert_eq!(names, vec!["a", "b"]);

        runtime.close().await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start:a", "start:b", "stop:b", "stop:a"]
        );
        assert!(runtime.deployments().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_start_is_not_registered() {
        let log = Log::default();
        let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
        let mut unit = Recorded::new("broken", &log);
        unit.fail_start = true;

        let error = runtime.deploy(Box::new(unit)).await.unwrap_err();
        assert!(matches!(error, RuntimeError::StartFailed { ref name, .. } if name == "broken"));
        assert!(runtime.deployments().await.is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_rejects_deploys() {
        let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
        runtime.close().await.unwrap();
        runtime.close().await.unwrap();
        assert!(runtime.is_closed());
        assert!(matches!(
            runtime.deploy(Box::new(Plain)).await,
            Err(RuntimeError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_signal_fires_on_close() {
        let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
        let signal = tokio::spawn(runtime.shutdown_signal());
        runtime.close().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), signal)
            .await
            .unwrap()
            .unwrap();

        // Subscribing after close resolves immediately.
        tokio::time::timeout(Duration::from_secs(1), runtime.shutdown_signal())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_slow_stop_times_out() {
        let log = Log::default();
        let runtime = Runtime::new(
            RuntimeOptions::default().with_shutdown_timeout(Duration::from_millis(20)),
        )
        .unwrap();
        let mut slow = Recorded::new("slow", &log);
        slow.stop_delay = Duration::from_secs(5);
        runtime.deploy(Box::new(slow)).await.unwrap();
        runtime.deploy(Box::new(Recorded::new("fast", &log))).await.unwrap();

        let error = runtime.close().await.unwrap_err();
        assert!(matches!(error, RuntimeError::ShutdownTimeout(ref names) if names == &["slow"]));
        assert!(log.lock().unwrap().contains(&"stop:fast".to_string()));
    }

    #[tokio::test]
    async fn test_metrics_handle_when_enabled() {
        let runtime = Runtime::new(RuntimeOptions::default().with_metrics(
            crate::options::MetricsOptions {
                enabled: true,
                prometheus: true,
            },
        ))
        .unwrap();
        assert!(runtime.metrics_handle().is_some());
    }
}
