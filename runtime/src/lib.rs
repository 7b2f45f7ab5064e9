//! # Launchpad Runtime
//!
//! Runtime instance, lifecycle callbacks and the bootstrap orchestrator.
//!
//! ## Core Components
//!
//! - **[`Runtime`]**: hosts [`Deployable`] units, broadcasts shutdown and
//!   stops units in reverse order
//! - **[`Application`]**: the bootstrap pipeline; loads configuration,
//!   creates the runtime, builds the initialization context, runs the
//!   pre-handler, deploys every unit concurrently and runs the post-handler
//! - **Callbacks**: [`RuntimeOptionsConfigurer`],
//!   [`InitializationContextConfigurer`], [`InitializationHandler`] and
//!   [`UnitConfigurer`], each implemented for closures
//! - **Composites**: [`CompositeHandler`] and [`CompositeContextConfigurer`]
//!   fan out concurrently and join
//!
//! ## Example
//!
//! ```no_run
//! use futures::future::BoxFuture;
//! use futures::FutureExt;
//! use launchpad_core::{ConfigTree, ConfigurationLoader, InitializationContext};
//! use launchpad_runtime::{Application, Deployable, Runtime};
//!
//! struct Worker;
//!
//! impl Deployable for Worker {
//!     fn start<'a>(&'a mut self, _runtime: &'a Runtime) -> BoxFuture<'a, anyhow::Result<()>> {
//!         async { Ok(()) }.boxed()
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let app = Application::builder()
//!     .configuration_loader(ConfigurationLoader::default())
//!     .unit_configurer(|_: Runtime, _: InitializationContext, _: ConfigTree| {
//!         Ok::<_, anyhow::Error>(Box::new(Worker) as Box<dyn Deployable>)
//!     })
//!     .build();
//!
//! let context = app.create().await?;
//! context.close().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod application;
pub mod error;
pub mod handler;
pub mod logging;
/// Prometheus metrics for observability
pub mod metrics;
pub mod options;
pub mod runtime;

pub use application::{Application, ApplicationBuilder, RuntimeContext};
pub use error::{ApplicationError, DeploymentError, DeploymentResult, RuntimeError};
pub use handler::{
    CompositeContextConfigurer, CompositeHandler, InitializationContextConfigurer,
    InitializationHandler, NoopHandler, UnitConfigurer, composite_context_configurer,
    composite_handler,
};
pub use logging::LoggingHandler;
pub use options::{
    CompositeOptionsConfigurer, MetricsOptions, MetricsOptionsConfigurer, RuntimeOptions,
    RuntimeOptionsConfigurer, TracingOptions, TracingOptionsConfigurer,
};
pub use runtime::{Deployable, DeploymentId, Runtime};
