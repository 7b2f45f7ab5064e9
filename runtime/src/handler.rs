//! Callback traits run by the bootstrap pipeline, and their composites.
//!
//! Every trait is implemented for plain closures taking owned, cheap-clone
//! arguments, so most applications never name these types:
//!
//! ```
//! use launchpad_core::{ConfigTree, InitializationContext};
//! use launchpad_runtime::{Application, Runtime};
//!
//! let app = Application::builder()
//!     .pre_handler(|_runtime: Runtime, context: InitializationContext, config: ConfigTree| async move {
//!         context.add("greeting", config.get_str_or("/greeting", "hello").to_string());
//!         Ok::<_, anyhow::Error>(())
//!     })
//!     .build();
//! ```

use crate::runtime::{Deployable, Runtime, simple_type_name};
use futures::FutureExt;
use futures::future::BoxFuture;
use launchpad_core::{ConfigTree, InitializationContext, join_all_settled};
use std::future::Future;
use std::sync::Arc;

/// Populates the [`InitializationContext`] before units are deployed.
pub trait InitializationContextConfigurer: Send + Sync {
    /// Add entries to `context` and return it.
    fn configure(
        &self,
        context: InitializationContext,
        runtime: &Runtime,
        config: &ConfigTree,
    ) -> BoxFuture<'static, anyhow::Result<InitializationContext>>;
}

impl<F, Fut> InitializationContextConfigurer for F
where
    F: Fn(InitializationContext, Runtime, ConfigTree) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<InitializationContext>> + Send + 'static,
{
    fn configure(
        &self,
        context: InitializationContext,
        runtime: &Runtime,
        config: &ConfigTree,
    ) -> BoxFuture<'static, anyhow::Result<InitializationContext>> {
        self(context, runtime.clone(), config.clone()).boxed()
    }
}

/// An asynchronous step run before or after deployment.
pub trait InitializationHandler: Send + Sync {
    /// Run the step.
    fn handle(
        &self,
        runtime: &Runtime,
        context: &InitializationContext,
        config: &ConfigTree,
    ) -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<F, Fut> InitializationHandler for F
where
    F: Fn(Runtime, InitializationContext, ConfigTree) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn handle(
        &self,
        runtime: &Runtime,
        context: &InitializationContext,
        config: &ConfigTree,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        self(runtime.clone(), context.clone(), config.clone()).boxed()
    }
}

/// Builds one deployable unit.
pub trait UnitConfigurer: Send + Sync {
    /// Name reported when [`create`](Self::create) fails.
    fn name(&self) -> String {
        simple_type_name(std::any::type_name::<Self>()).to_string()
    }

    /// Construct the unit. Starting it is the runtime's job.
    ///
    /// # Errors
    ///
    /// Any error the configurer reports; the unit is recorded as failed.
    fn create(
        &self,
        runtime: &Runtime,
        context: &InitializationContext,
        config: &ConfigTree,
    ) -> anyhow::Result<Box<dyn Deployable>>;
}

impl<F> UnitConfigurer for F
where
    F: Fn(Runtime, InitializationContext, ConfigTree) -> anyhow::Result<Box<dyn Deployable>>
        + Send
        + Sync,
{
    fn create(
        &self,
        runtime: &Runtime,
        context: &InitializationContext,
        config: &ConfigTree,
    ) -> anyhow::Result<Box<dyn Deployable>> {
        self(runtime.clone(), context.clone(), config.clone())
    }
}

/// Handler that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl InitializationHandler for NoopHandler {
    fn handle(
        &self,
        _runtime: &Runtime,
        _context: &InitializationContext,
        _config: &ConfigTree,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        futures::future::ready(Ok(())).boxed()
    }
}

/// Runs several handlers concurrently.
///
/// Succeeds when every handler succeeds. Otherwise fails with the error of
/// the first failing handler in registration order, after all have settled.
#[derive(Clone, Default)]
pub struct CompositeHandler {
    handlers: Vec<Arc<dyn InitializationHandler>>,
}

impl CompositeHandler {
    /// An empty composite, which succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler.
    #[must_use]
    pub fn with(mut self, handler: impl InitializationHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the composite has no handlers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl InitializationHandler for CompositeHandler {
    fn handle(
        &self,
        runtime: &Runtime,
        context: &InitializationContext,
        config: &ConfigTree,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        let pending: Vec<_> = self
            .handlers
            .iter()
            .map(|handler| handler.handle(runtime, context, config))
            .collect();
        async move { join_all_settled(pending).await.map(|_| ()) }.boxed()
    }
}

/// Build a [`CompositeHandler`] from boxed handlers.
#[must_use]
pub fn composite_handler(handlers: Vec<Arc<dyn InitializationHandler>>) -> CompositeHandler {
    CompositeHandler { handlers }
}

/// Runs several context configurers concurrently against one shared context.
///
/// Error reporting follows [`CompositeHandler`].
#[derive(Clone, Default)]
pub struct CompositeContextConfigurer {
    configurers: Vec<Arc<dyn InitializationContextConfigurer>>,
}

impl CompositeContextConfigurer {
    /// An empty composite, which returns the context unchanged.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a configurer.
    #[must_use]
    pub fn with(mut self, configurer: impl InitializationContextConfigurer + 'static) -> Self {
        self.configurers.push(Arc::new(configurer));
        self
    }
}

impl InitializationContextConfigurer for CompositeContextConfigurer {
    fn configure(
        &self,
        context: InitializationContext,
        runtime: &Runtime,
        config: &ConfigTree,
    ) -> BoxFuture<'static, anyhow::Result<InitializationContext>> {
        let pending: Vec<_> = self
            .configurers
            .iter()
            .map(|configurer| configurer.configure(context.clone(), runtime, config))
            .collect();
        async move {
            join_all_settled(pending).await?;
            Ok(context)
        }
        .boxed()
    }
}

/// Build a [`CompositeContextConfigurer`] from boxed configurers.
#[must_use]
pub fn composite_context_configurer(
    configurers: Vec<Arc<dyn InitializationContextConfigurer>>,
) -> CompositeContextConfigurer {
    CompositeContextConfigurer { configurers }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::options::RuntimeOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeOptions::default()).unwrap()
    }

    fn counting(
        counter: &Arc<AtomicUsize>,
        fail: Option<&'static str>,
    ) -> impl InitializationHandler + 'static {
        let counter = Arc::clone(counter);
        move |_: Runtime, _: InitializationContext, _: ConfigTree| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                match fail {
                    Some(message) => Err(anyhow::anyhow!(message)),
                    None => Ok(()),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_empty_composite_succeeds() {
        let composite = CompositeHandler::new();
        assert!(composite.is_empty());
        composite
            .handle(&runtime(), &InitializationContext::new(), &ConfigTree::empty())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_composite_succeeds_when_all_succeed() {
        let counter = Arc::new(AtomicUsize::new(0));
        let composite = CompositeHandler::new()
            .with(counting(&counter, None))
            .with(counting(&counter, None))
            .with(NoopHandler);

        composite
            .handle(&runtime(), &InitializationContext::new(), &ConfigTree::empty())
            .await
            .unwrap();
        assert_eq!(composite.len(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_composite_fails_with_first_cause_after_all_settle() {
        let counter = Arc::new(AtomicUsize::new(0));
        let composite = CompositeHandler::new()
            .with(counting(&counter, None))
            .with(counting(&counter, Some("first")))
            .with(counting(&counter, Some("second")));

        let error = composite
            .handle(&runtime(), &InitializationContext::new(), &ConfigTree::empty())
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "first");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_composite_context_configurer_shares_context() {
        let composite = CompositeContextConfigurer::new()
            .with(|context: InitializationContext, _: Runtime, _: ConfigTree| async move {
                context.add("a", 1_i32);
                Ok::<_, anyhow::Error>(context)
            })
            .with(|context: InitializationContext, _: Runtime, config: ConfigTree| async move {
                context.add("b", config.get_str_or("/b", "default").to_string());
                Ok::<_, anyhow::Error>(context)
            });

        let context = composite
            .configure(InitializationContext::new(), &runtime(), &ConfigTree::empty())
            .await
            .unwrap();
        assert_eq!(*context.get::<i32>("a").unwrap(), 1);
        assert_eq!(context.get::<String>("b").unwrap().as_str(), "default");
    }

    #[tokio::test]
    async fn test_composite_context_configurer_failure() {
        let composite = composite_context_configurer(vec![Arc::new(
            |_: InitializationContext, _: Runtime, _: ConfigTree| async move {
                Err::<InitializationContext, _>(anyhow::anyhow!("no pool"))
            },
        )]);

        let error = composite
            .configure(InitializationContext::new(), &runtime(), &ConfigTree::empty())
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "no pool");
    }
}
