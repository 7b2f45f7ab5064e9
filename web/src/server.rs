//! The HTTP server deployable unit.
//!
//! ```yaml
//! http:
//!   server:
//!     host: 0.0.0.0   # default
//!     port: 8080      # default
//! ```
//!
//! # Start-up
//!
//! 1. Every [`RouterConfigurer`] runs concurrently; the first failure aborts
//! 2. Sub-routers are mounted in registration order
//! 3. [`RouterHandler`]s are applied last to first, so a handler registered
//!    earlier wraps every route added after it
//! 4. The listener is bound and served until [`Deployable::stop`] or the
//!    runtime shuts down

use crate::error::ServerError;
use crate::router::{RouterConfigurer, RouterHandler, mount};
use axum::Router;
use futures::FutureExt;
use futures::future::BoxFuture;
use launchpad_core::{ConfigTree, InitializationContext, join_all_settled};
use launchpad_runtime::{Deployable, Runtime, UnitConfigurer};
use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// `http.server.port`
pub const CONFIG_HTTP_SERVER_PORT: &str = "/http/server/port";
/// `http.server.host`
pub const CONFIG_HTTP_SERVER_HOST: &str = "/http/server/host";
/// Port used when `http.server.port` is absent.
pub const DEFAULT_PORT: i64 = 8080;
/// Host used when `http.server.host` is absent.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpServerOptions {
    /// Interface to bind
    pub host: String,
    /// Port to bind instead of `http.server.port`
    pub port_override: Option<u16>,
}

impl Default for HttpServerOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port_override: None,
        }
    }
}

impl HttpServerOptions {
    /// Options with the host read from `http.server.host`.
    #[must_use]
    pub fn from_config(config: &ConfigTree) -> Self {
        Self {
            host: config.get_str_or(CONFIG_HTTP_SERVER_HOST, DEFAULT_HOST).to_string(),
            port_override: None,
        }
    }

    /// Set the interface to bind.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Bind `port` regardless of configuration.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port_override = Some(port);
        self
    }
}

/// Adjusts [`HttpServerOptions`] before the listener is bound.
pub trait HttpServerOptionsConfigurer: Send + Sync {
    /// Return the options to use.
    fn configure(&self, options: HttpServerOptions, config: &ConfigTree) -> HttpServerOptions;
}

impl<F> HttpServerOptionsConfigurer for F
where
    F: Fn(HttpServerOptions, &ConfigTree) -> HttpServerOptions + Send + Sync,
{
    fn configure(&self, options: HttpServerOptions, config: &ConfigTree) -> HttpServerOptions {
        self(options, config)
    }
}

struct Running {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

/// Axum server deployed as a [`Deployable`] unit.
///
/// # Example
///
/// ```no_run
/// use axum::{Router, routing::get};
/// use launchpad_core::ConfigTree;
/// use launchpad_runtime::Application;
/// use launchpad_web::{HealthCheckHandler, HttpServerUnit};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let server = HttpServerUnit::builder()
///     .sub_router_configurer(|_config: ConfigTree| async {
///         let router = Router::new().route("/ping", get(|| async { "pong" }));
///         Ok::<_, anyhow::Error>(("/api".to_string(), router))
///     })
///     .router_handler(HealthCheckHandler);
///
/// let app = Application::builder().unit_configurer(server).build();
/// let context = app.create().await?;
/// # context.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct HttpServerUnit {
    config: ConfigTree,
    sub_router_configurers: Vec<Arc<dyn RouterConfigurer>>,
    router_handlers: Vec<Arc<dyn RouterHandler>>,
    options_configurer: Option<Arc<dyn HttpServerOptionsConfigurer>>,
    running: Option<Running>,
}

impl fmt::Debug for HttpServerUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServerUnit")
            .field("sub_router_configurers", &self.sub_router_configurers.len())
            .field("router_handlers", &self.router_handlers.len())
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

impl HttpServerUnit {
    /// Start building a server.
    #[must_use]
    pub fn builder() -> HttpServerUnitBuilder {
        HttpServerUnitBuilder::default()
    }

    /// Bound address, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    /// Build the router, bind and start serving.
    ///
    /// # Errors
    ///
    /// - [`ServerError::AlreadyStarted`] if the unit is serving
    /// - [`ServerError::Routes`] if a sub-router configurer fails or the
    ///   routes conflict
    /// - [`ServerError::InvalidPort`] if `http.server.port` is out of range
    /// - [`ServerError::Bind`] if the listener cannot be bound
    pub async fn serve(&mut self, runtime: &Runtime) -> Result<SocketAddr, ServerError> {
        if let Some(running) = &self.running {
            return Err(ServerError::AlreadyStarted(running.local_addr));
        }

        let router = self.router(runtime).await?;
        let listener = self.bind().await?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: self.options().host,
            source,
        })?;

        let (shutdown, stopped) = oneshot::channel::<()>();
        let runtime_closed = runtime.shutdown_signal();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    tokio::select! {
                        _ = stopped => {}
                        () = runtime_closed => {}
                    }
                })
                .await
        });

        tracing::info!(%local_addr, "Http server started on port {}", local_addr.port());
        self.running = Some(Running {
            local_addr,
            shutdown,
            task,
        });
        Ok(local_addr)
    }

    async fn router(&self, runtime: &Runtime) -> Result<Router, ServerError> {
        let configured = join_all_settled(
            self.sub_router_configurers
                .iter()
                .map(|configurer| configurer.configure(self.config.clone())),
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %format_args!("{e:#}"), "Http server initialization failed while configuring routes");
            ServerError::Routes(e)
        })?;

        // axum panics on invalid or conflicting routes.
        let assembled = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut router = Router::new();
            for (prefix, sub_router) in configured {
                tracing::debug!(prefix = %prefix, "Mounting sub-router");
                router = mount(router, &prefix, sub_router);
            }
            for handler in self.router_handlers.iter().rev() {
                router = handler.apply(runtime, router, &self.config);
            }
            router
        }));

        assembled.map_err(|payload| {
            let reason = panic_message(payload.as_ref());
            tracing::error!(error = %reason, "Http server initialization failed while configuring routes");
            ServerError::Routes(anyhow::anyhow!(reason))
        })
    }

    fn options(&self) -> HttpServerOptions {
        let options = HttpServerOptions::from_config(&self.config);
        match &self.options_configurer {
            Some(configurer) => configurer.configure(options, &self.config),
            None => options,
        }
    }

    async fn bind(&self) -> Result<TcpListener, ServerError> {
        let options = self.options();
        let port = match options.port_override {
            Some(port) => port,
            None => {
                let port = self.config.get_i64_or(CONFIG_HTTP_SERVER_PORT, DEFAULT_PORT);
                u16::try_from(port).map_err(|_| {
                    tracing::error!(port, "Error starting http server: invalid port");
                    ServerError::InvalidPort(port)
                })?
            }
        };

        let addr = format!("{}:{port}", options.host);
        TcpListener::bind(&addr).await.map_err(|source| {
            tracing::error!(addr = %addr, error = %source, "Error starting http server");
            ServerError::Bind { addr, source }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "router assembly panicked".to_string())
}

impl Deployable for HttpServerUnit {
    fn start<'a>(&'a mut self, runtime: &'a Runtime) -> BoxFuture<'a, anyhow::Result<()>> {
        async move {
            self.serve(runtime).await?;
            Ok(())
        }
        .boxed()
    }

    fn stop(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
        async move {
            let Some(running) = self.running.take() else {
                return Ok(());
            };
            // The server may already be down after a runtime shutdown.
            let _ = running.shutdown.send(());
            running.task.await??;
            tracing::info!(local_addr = %running.local_addr, "Http server stopped");
            Ok(())
        }
        .boxed()
    }
}

/// Builder for [`HttpServerUnit`].
///
/// Also a [`UnitConfigurer`]: each `create` builds a fresh unit from the
/// application configuration.
#[derive(Clone, Default)]
pub struct HttpServerUnitBuilder {
    config: ConfigTree,
    sub_router_configurers: Vec<Arc<dyn RouterConfigurer>>,
    router_handlers: Vec<Arc<dyn RouterHandler>>,
    options_configurer: Option<Arc<dyn HttpServerOptionsConfigurer>>,
}

impl fmt::Debug for HttpServerUnitBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServerUnitBuilder")
            .field("sub_router_configurers", &self.sub_router_configurers.len())
            .field("router_handlers", &self.router_handlers.len())
            .finish_non_exhaustive()
    }
}

impl HttpServerUnitBuilder {
    /// Configuration read by the server and passed to every callback.
    #[must_use]
    pub fn config(mut self, config: ConfigTree) -> Self {
        self.config = config;
        self
    }

    /// Replace the sub-router configurers.
    #[must_use]
    pub fn sub_router_configurers(mut self, configurers: Vec<Arc<dyn RouterConfigurer>>) -> Self {
        self.sub_router_configurers = configurers;
        self
    }

    /// Add a sub-router configurer.
    #[must_use]
    pub fn sub_router_configurer(mut self, configurer: impl RouterConfigurer + 'static) -> Self {
        self.sub_router_configurers.push(Arc::new(configurer));
        self
    }

    /// Replace the router handlers.
    #[must_use]
    pub fn router_handlers(mut self, handlers: Vec<Arc<dyn RouterHandler>>) -> Self {
        self.router_handlers = handlers;
        self
    }

    /// Add a router handler.
    #[must_use]
    pub fn router_handler(mut self, handler: impl RouterHandler + 'static) -> Self {
        self.router_handlers.push(Arc::new(handler));
        self
    }

    /// Adjust listener options.
    #[must_use]
    pub fn server_options_configurer(
        mut self,
        configurer: impl HttpServerOptionsConfigurer + 'static,
    ) -> Self {
        self.options_configurer = Some(Arc::new(configurer));
        self
    }

    /// Build the unit.
    #[must_use]
    pub fn build(self) -> HttpServerUnit {
        HttpServerUnit {
            config: self.config,
            sub_router_configurers: self.sub_router_configurers,
            router_handlers: self.router_handlers,
            options_configurer: self.options_configurer,
            running: None,
        }
    }
}

impl UnitConfigurer for HttpServerUnitBuilder {
    fn name(&self) -> String {
        "HttpServerUnit".to_string()
    }

    fn create(
        &self,
        _runtime: &Runtime,
        _context: &InitializationContext,
        config: &ConfigTree,
    ) -> anyhow::Result<Box<dyn Deployable>> {
        Ok(Box::new(self.clone().config(config.clone()).build()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use axum::routing::get;
    use launchpad_runtime::RuntimeOptions;
    use launchpad_testing::free_port;
    use serde_json::json;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeOptions::default()).unwrap()
    }

    fn local(port: u16) -> ConfigTree {
        ConfigTree::new(json!({ "http": { "server": { "host": "127.0.0.1", "port": port } } }))
    }

    #[test]
    fn test_options_from_config() {
        assert_eq!(HttpServerOptions::from_config(&ConfigTree::empty()).host, "0.0.0.0");
        assert_eq!(HttpServerOptions::from_config(&local(1)).host, "127.0.0.1");
    }

    #[test]
    fn test_unit_name() {
        let builder = HttpServerUnit::builder();
        assert_eq!(UnitConfigurer::name(&builder), "HttpServerUnit");
        assert_eq!(Deployable::name(&builder.build()), "HttpServerUnit");
    }

    #[tokio::test]
    async fn test_serve_and_stop() {
        let runtime = runtime();
        let mut unit = HttpServerUnit::builder()
            .config(local(0))
            .sub_router_configurer(|_: ConfigTree| async {
                Ok::<_, anyhow::Error>(("/".to_string(), Router::new().route("/ping", get(|| async { "pong" }))))
            })
            .build();

        let addr = unit.serve(&runtime).await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(unit.local_addr(), Some(addr));
        assert!(matches!(unit.serve(&runtime).await, Err(ServerError::AlreadyStarted(a)) if a == addr));

        unit.stop().await.unwrap();
        assert_eq!(unit.local_addr(), None);
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_conflicting_routes_are_an_error() {
        let mut unit = HttpServerUnit::builder()
            .config(local(0))
            .sub_router_configurer(|_: ConfigTree| async {
                Ok::<_, anyhow::Error>(("/".to_string(), Router::new().route("/ping", get(|| async { "a" }))))
            })
            .router_handler(|_: Runtime, router: Router, _: ConfigTree| {
                router.route("/ping", get(|| async { "b" }))
            })
            .build();

        let error = unit.serve(&runtime()).await.unwrap_err();
        let ServerError::Routes(cause) = &error else {
            panic!("expected a routes error, got {error}");
        };
        assert!(cause.to_string().contains("/ping"), "{cause}");
        assert_eq!(unit.local_addr(), None);
    }

    #[test]
    fn test_panic_message() {
        let text: Box<dyn Any + Send> = Box::new("static text");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned text"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(text.as_ref()), "static text");
        assert_eq!(panic_message(owned.as_ref()), "owned text");
        assert_eq!(panic_message(other.as_ref()), "router assembly panicked");
    }

    #[tokio::test]
    async fn test_invalid_port() {
        let config = ConfigTree::new(json!({ "http": { "server": { "port": 70000 } } }));
        let mut unit = HttpServerUnit::builder().config(config).build();

        let error = unit.serve(&runtime()).await.unwrap_err();
        assert!(matches!(error, ServerError::InvalidPort(70000)));
    }

    #[tokio::test]
    async fn test_options_configurer_overrides_port() {
        let port = free_port();
        let mut unit = HttpServerUnit::builder()
            .config(local(1))
            .server_options_configurer(move |options: HttpServerOptions, _: &ConfigTree| {
                options.with_port(port)
            })
            .build();

        let addr = unit.serve(&runtime()).await.unwrap();
        assert_eq!(addr.port(), port);
        unit.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_runtime_close_stops_server() {
        let runtime = runtime();
        let port = free_port();
        runtime
            .deploy(Box::new(HttpServerUnit::builder().config(local(port)).build()))
            .await
            .unwrap();
        assert!(tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok());

        runtime.close().await.unwrap();
        assert!(tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }
}
