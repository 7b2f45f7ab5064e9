//! The bootstrap orchestrator.
//!
//! [`Application::create`] runs a fixed pipeline:
//!
//! ```text
//! load config -> create runtime -> build context -> pre-handler
//!             -> deploy units (concurrently) -> post-handler -> ready
//! ```
//!
//! The first failing stage aborts the rest. A runtime created before a later
//! stage fails stays alive until [`Application::close`] is called.

use crate::error::{ApplicationError, DeploymentError, DeploymentResult, RuntimeError};
use crate::handler::{InitializationContextConfigurer, InitializationHandler, UnitConfigurer};
use crate::metrics::DeploymentMetrics;
use crate::options::{RuntimeOptions, RuntimeOptionsConfigurer};
use crate::runtime::Runtime;
use launchpad_core::{ConfigTree, ConfigurationLoader, InitializationContext, settle_all};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::Instrument;

/// Everything a successful bootstrap produced.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    runtime: Runtime,
    context: InitializationContext,
    config: ConfigTree,
}

impl RuntimeContext {
    /// Bundle the bootstrap artifacts.
    #[must_use]
    pub const fn new(runtime: Runtime, context: InitializationContext, config: ConfigTree) -> Self {
        Self {
            runtime,
            context,
            config,
        }
    }

    /// The live runtime.
    #[must_use]
    pub const fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// The populated initialization context.
    #[must_use]
    pub const fn context(&self) -> &InitializationContext {
        &self.context
    }

    /// The resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &ConfigTree {
        &self.config
    }

    /// Shut the runtime down.
    ///
    /// # Errors
    ///
    /// See [`Runtime::close`].
    pub async fn close(&self) -> Result<(), RuntimeError> {
        self.runtime.close().await
    }
}

/// Configured bootstrap pipeline.
///
/// # Example
///
/// ```no_run
/// use launchpad_core::ConfigurationLoader;
/// use launchpad_runtime::{Application, CompositeOptionsConfigurer};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let app = Application::builder()
///     .configuration_loader(ConfigurationLoader::default())
///     .options_configurer(CompositeOptionsConfigurer::standard())
///     .build();
///
/// let context = app.create().await?;
/// // ... serve until told to stop ...
/// app.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Application {
    loader: Option<ConfigurationLoader>,
    options_configurer: Option<Arc<dyn RuntimeOptionsConfigurer>>,
    context_configurer: Option<Arc<dyn InitializationContextConfigurer>>,
    pre_handler: Option<Arc<dyn InitializationHandler>>,
    post_handler: Option<Arc<dyn InitializationHandler>>,
    units: Vec<Arc<dyn UnitConfigurer>>,
    runtime: Mutex<Option<Runtime>>,
}

impl Application {
    /// Start building an application.
    #[must_use]
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::default()
    }

    /// Run the bootstrap pipeline.
    ///
    /// Without a configuration loader the configuration is empty.
    ///
    /// # Errors
    ///
    /// Returns the [`ApplicationError`] of the first stage that failed.
    pub async fn create(&self) -> Result<RuntimeContext, ApplicationError> {
        async {
            let config = match &self.loader {
                Some(loader) => loader.load().await.map_err(ApplicationError::Configuration)?,
                None => ConfigTree::empty(),
            };
            self.configure_and_deploy(config).await
        }
        .instrument(tracing::info_span!("application.create"))
        .await
    }

    /// Run every stage after configuration loading.
    ///
    /// A runtime left by an earlier call is closed first.
    ///
    /// # Errors
    ///
    /// Returns the [`ApplicationError`] of the first stage that failed.
    pub async fn configure_and_deploy(
        &self,
        config: ConfigTree,
    ) -> Result<RuntimeContext, ApplicationError> {
        let options = match &self.options_configurer {
            Some(configurer) => configurer.configure(RuntimeOptions::default(), &config),
            None => RuntimeOptions::default(),
        };
        let previous = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            tracing::warn!("Closing the runtime of the previous create before starting a new one");
            if let Err(e) = previous.close().await {
                tracing::error!(error = %format_args!("{e:#}"), "Closing the previous runtime failed");
            }
        }

        let runtime = Runtime::new(options).map_err(ApplicationError::Runtime)?;
        *self.runtime.lock().unwrap_or_else(PoisonError::into_inner) = Some(runtime.clone());

        let context = match &self.context_configurer {
            Some(configurer) => configurer
                .configure(InitializationContext::new(), &runtime, &config)
                .await
                .map_err(ApplicationError::Context)?,
            None => InitializationContext::new(),
        };
        tracing::debug!(keys = ?context.keys(), "Initialization context configured");

        if let Some(handler) = &self.pre_handler {
            handler
                .handle(&runtime, &context, &config)
                .await
                .map_err(ApplicationError::PreHandler)?;
        }

        let results = self.deploy_units(&runtime, &context, &config).await?;
        tracing::info!(units = results.len(), "All units started");

        if let Some(handler) = &self.post_handler {
            handler
                .handle(&runtime, &context, &config)
                .await
                .map_err(ApplicationError::PostHandler)?;
        }

        Ok(RuntimeContext::new(runtime, context, config))
    }

    /// Deploy every registered unit concurrently and wait for all of them.
    ///
    /// # Errors
    ///
    /// Returns a [`DeploymentError`] holding every unit's result when at
    /// least one unit failed.
    pub async fn deploy_units(
        &self,
        runtime: &Runtime,
        context: &InitializationContext,
        config: &ConfigTree,
    ) -> Result<Vec<DeploymentResult>, DeploymentError> {
        let pending = self.units.iter().map(|configurer| {
            let created = configurer.create(runtime, context, config);
            let fallback_name = configurer.name();
            async move {
                let unit = match created {
                    Ok(unit) => unit,
                    Err(e) => {
                        let cause = format!("{e:#}");
                        tracing::error!(unit = %fallback_name, error = %cause, "Creating unit '{}' failed", fallback_name);
                        return DeploymentResult::failed(fallback_name, cause);
                    }
                };
                let name = unit.name();
                match runtime.deploy(unit).await {
                    Ok(id) => {
                        tracing::debug!(unit = %name, id = %id, "Unit '{}' started", name);
                        DeploymentResult::succeeded(name, id)
                    }
                    Err(e) => {
                        let cause = match e {
                            RuntimeError::StartFailed { source, .. } => format!("{source:#}"),
                            other => other.to_string(),
                        };
                        tracing::error!(unit = %name, error = %cause, "Starting unit '{}' failed", name);
                        DeploymentResult::failed(name, cause)
                    }
                }
            }
        });

        let results = settle_all(pending).await;
        for result in &results {
            if result.success {
                DeploymentMetrics::record_started(&result.name);
            } else {
                DeploymentMetrics::record_failed(&result.name);
            }
        }

        if results.iter().all(|r| r.success) {
            Ok(results)
        } else {
            Err(DeploymentError { results })
        }
    }

    /// The runtime created by [`create`](Self::create), if any.
    ///
    /// Present even when a later stage failed.
    #[must_use]
    pub fn runtime(&self) -> Option<Runtime> {
        self.runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Shut down the runtime, if one was created.
    ///
    /// Safe to call repeatedly, or before `create`.
    ///
    /// # Errors
    ///
    /// See [`Runtime::close`].
    pub async fn close(&self) -> Result<(), RuntimeError> {
        match self.runtime() {
            Some(runtime) => runtime.close().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("loader", &self.loader)
            .field("units", &self.units.len())
            .field("runtime", &self.runtime())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Application`]. Every part is optional.
#[derive(Default)]
pub struct ApplicationBuilder {
    loader: Option<ConfigurationLoader>,
    options_configurer: Option<Arc<dyn RuntimeOptionsConfigurer>>,
    context_configurer: Option<Arc<dyn InitializationContextConfigurer>>,
    pre_handler: Option<Arc<dyn InitializationHandler>>,
    post_handler: Option<Arc<dyn InitializationHandler>>,
    units: Vec<Arc<dyn UnitConfigurer>>,
}

impl ApplicationBuilder {
    /// Source of configuration.
    #[must_use]
    pub fn configuration_loader(mut self, loader: ConfigurationLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Replace the unit configurers.
    #[must_use]
    pub fn unit_configurers(mut self, units: Vec<Arc<dyn UnitConfigurer>>) -> Self {
        self.units = units;
        self
    }

    /// Add one unit configurer.
    #[must_use]
    pub fn unit_configurer(mut self, unit: impl UnitConfigurer + 'static) -> Self {
        self.units.push(Arc::new(unit));
        self
    }

    /// Derives runtime options from configuration.
    #[must_use]
    pub fn options_configurer(mut self, configurer: impl RuntimeOptionsConfigurer + 'static) -> Self {
        self.options_configurer = Some(Arc::new(configurer));
        self
    }

    /// Populates the initialization context.
    #[must_use]
    pub fn context_configurer(
        mut self,
        configurer: impl InitializationContextConfigurer + 'static,
    ) -> Self {
        self.context_configurer = Some(Arc::new(configurer));
        self
    }

    /// Runs before units are deployed.
    #[must_use]
    pub fn pre_handler(mut self, handler: impl InitializationHandler + 'static) -> Self {
        self.pre_handler = Some(Arc::new(handler));
        self
    }

    /// Runs after every unit started.
    #[must_use]
    pub fn post_handler(mut self, handler: impl InitializationHandler + 'static) -> Self {
        self.post_handler = Some(Arc::new(handler));
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Application {
        Application {
            loader: self.loader,
            options_configurer: self.options_configurer,
            context_configurer: self.context_configurer,
            pre_handler: self.pre_handler,
            post_handler: self.post_handler,
            units: self.units,
            runtime: Mutex::new(None),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_application_starts_empty() {
        let app = Application::builder().build();
        let context = app.create().await.unwrap();

        assert_eq!(context.config(), &ConfigTree::empty());
        assert!(context.context().is_empty());
        assert!(context.runtime().deployments().await.is_empty());
        app.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_before_create() {
        let app = Application::builder().build();
        assert!(app.runtime().is_none());
        app.close().await.unwrap();
        app.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_options_configurer_sees_config() {
        let app = Application::builder()
            .configuration_loader(
                ConfigurationLoader::builder()
                    .disable_feature(launchpad_core::Feature::ClasspathConfig)
                    .environment(std::collections::HashMap::new())
                    .add_store(launchpad_core::ConfigStore::json(
                        serde_json::json!({ "name": "orders" }),
                    ))
                    .build(),
            )
            .options_configurer(|options: RuntimeOptions, config: &ConfigTree| {
                options.with_name(config.get_str_or("/name", "unnamed"))
            })
            .build();

        let context = app.create().await.unwrap();
        assert_eq!(context.runtime().options().name, "orders");
    }
}
