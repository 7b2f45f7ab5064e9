//! Integration tests for the bootstrap pipeline.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use launchpad_core::{ConfigTree, ConfigurationLoader, InitializationContext};
use launchpad_core::loader::CONFIGURATION_ENV;
use launchpad_runtime::{
    Application, ApplicationError, CompositeHandler, Deployable, NoopHandler, Runtime,
    UnitConfigurer,
};
use launchpad_testing::{ConfigDir, EventLog, FailingUnit, MockUnit, RecordingHandler};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Test Fixtures
// ============================================================================

fn mock(name: &'static str, log: &EventLog) -> impl UnitConfigurer + 'static {
    let log = log.clone();
    move |_: Runtime, _: InitializationContext, _: ConfigTree| {
        Ok::<_, anyhow::Error>(Box::new(MockUnit::new(name, &log)) as Box<dyn Deployable>)
    }
}

fn failing(name: &'static str) -> impl UnitConfigurer + 'static {
    move |_: Runtime, _: InitializationContext, _: ConfigTree| {
        Ok::<_, anyhow::Error>(
            Box::new(FailingUnit::new(name, "port already in use")) as Box<dyn Deployable>
        )
    }
}

// ============================================================================
// Deployment
// ============================================================================

#[tokio::test]
async fn test_one_failing_unit_fails_the_bootstrap() {
    let log = EventLog::default();
    let app = Application::builder()
        .unit_configurer(mock("First", &log))
        .unit_configurer(failing("Broken"))
        .unit_configurer(mock("Third", &log))
        .build();

    let error = app.create().await.unwrap_err();
    assert!(error.to_string().contains("not started successfully"));

    let ApplicationError::Deployment(deployment) = error else {
        panic!("expected a deployment error");
    };
    assert_eq!(deployment.failed_names(), vec!["Broken"]);
    assert_eq!(deployment.results.len(), 3);

    let started: Vec<_> = deployment
        .results
        .iter()
        .filter(|r| r.success)
        .map(|r| (r.name.as_str(), r.deployment_id.is_some()))
        .collect();
    assert_eq!(started, vec![("First", true), ("Third", true)]);
    assert_eq!(
        deployment.failures().next().and_then(|r| r.error.as_deref()),
        Some("port already in use")
    );

    // The successful siblings stay deployed on the live runtime.
    assert!(log.contains("start:First"));
    assert!(log.contains("start:Third"));
    let runtime = app.runtime().expect("runtime was created");
    assert_eq!(runtime.deployments().await.len(), 2);

    app.close().await.unwrap();
    assert!(log.contains("stop:First"));
    assert!(log.contains("stop:Third"));
}

#[tokio::test]
async fn test_all_units_started() {
    let log = EventLog::default();
    let units: Vec<Arc<dyn UnitConfigurer>> =
        vec![Arc::new(mock("Api", &log)), Arc::new(mock("Worker", &log))];
    let app = Application::builder().unit_configurers(units).build();

    let context = app.create().await.unwrap();
    let names: Vec<_> = context
        .runtime()
        .deployments()
        .await
        .into_iter()
        .map(|(_, name)| name)
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Api".to_string()));
    assert!(names.contains(&"Worker".to_string()));

    context.close().await.unwrap();
}

#[tokio::test]
async fn test_unit_creation_failure_is_reported_by_configurer_name() {
    struct MisconfiguredUnit;

    impl UnitConfigurer for MisconfiguredUnit {
        fn create(
            &self,
            _runtime: &Runtime,
            _context: &InitializationContext,
            _config: &ConfigTree,
        ) -> anyhow::Result<Box<dyn Deployable>> {
            anyhow::bail!("missing 'http' section")
        }
    }

    let app = Application::builder().unit_configurer(MisconfiguredUnit).build();
    let Err(ApplicationError::Deployment(error)) = app.create().await else {
        panic!("expected a deployment error");
    };
    assert_eq!(error.failed_names(), vec!["MisconfiguredUnit"]);
}

// ============================================================================
// Stage ordering
// ============================================================================

#[tokio::test]
async fn test_stages_run_in_order() {
    let log = EventLog::default();
    let context_log = log.clone();
    let app = Application::builder()
        .context_configurer(move |context: InitializationContext, _: Runtime, _: ConfigTree| {
            let log = context_log.clone();
            async move {
                log.push("context");
                context.add("ready", true);
                Ok::<_, anyhow::Error>(context)
            }
        })
        .pre_handler(RecordingHandler::new("pre", &log))
        .unit_configurer(mock("Unit", &log))
        .post_handler(RecordingHandler::new("post", &log))
        .build();

    let context = app.create().await.unwrap();
    assert_eq!(log.entries(), vec!["context", "pre", "start:Unit", "post"]);
    assert!(*context.context().get::<bool>("ready").unwrap());
}

#[tokio::test]
async fn test_second_create_closes_previous_runtime() {
    let log = EventLog::default();
    let app = Application::builder().unit_configurer(mock("Unit", &log)).build();

    let first = app.create().await.unwrap();
    let second = app.create().await.unwrap();

    assert!(first.runtime().is_closed());
    assert!(!second.runtime().is_closed());
    assert_eq!(log.entries(), vec!["start:Unit", "stop:Unit", "start:Unit"]);

    app.close().await.unwrap();
    assert!(second.runtime().is_closed());
}

#[tokio::test]
async fn test_pre_handler_failure_short_circuits() {
    let log = EventLog::default();
    let app = Application::builder()
        .pre_handler(RecordingHandler::failing("pre", &log, "migration failed"))
        .unit_configurer(mock("Unit", &log))
        .post_handler(RecordingHandler::new("post", &log))
        .build();

    let error = app.create().await.unwrap_err();
    assert!(matches!(error, ApplicationError::PreHandler(_)));
    assert_eq!(error.to_string(), "Pre-deployment handler failed");
    let ApplicationError::PreHandler(cause) = &error else {
        panic!("expected a pre-handler error");
    };
    assert_eq!(cause.to_string(), "migration failed");
    assert_eq!(log.entries(), vec!["pre"]);

    // The runtime was created before the failing stage and stays live.
    let runtime = app.runtime().expect("runtime was created");
    assert!(!runtime.is_closed());
    app.close().await.unwrap();
    assert!(runtime.is_closed());
}

#[tokio::test]
async fn test_post_handler_failure_is_reported() {
    let log = EventLog::default();
    let app = Application::builder()
        .unit_configurer(mock("Unit", &log))
        .post_handler(RecordingHandler::failing("post", &log, "announce failed"))
        .build();

    assert!(matches!(
        app.create().await,
        Err(ApplicationError::PostHandler(_))
    ));
    assert!(log.contains("start:Unit"));
}

#[tokio::test]
async fn test_context_configurer_failure() {
    let log = EventLog::default();
    let app = Application::builder()
        .context_configurer(|_: InitializationContext, _: Runtime, _: ConfigTree| async {
            Err::<InitializationContext, _>(anyhow::anyhow!("unknown database type"))
        })
        .pre_handler(RecordingHandler::new("pre", &log))
        .build();

    assert!(matches!(
        app.create().await,
        Err(ApplicationError::Context(_))
    ));
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_composite_pre_handler() {
    let log = EventLog::default();
    let app = Application::builder()
        .pre_handler(
            CompositeHandler::new()
                .with(RecordingHandler::new("a", &log))
                .with(RecordingHandler::new("b", &log))
                .with(NoopHandler),
        )
        .build();

    app.create().await.unwrap();
    assert!(log.contains("a"));
    assert!(log.contains("b"));
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn test_environment_file_overrides_default_file() {
    let dir = ConfigDir::new();
    dir.write(
        "application.yml",
        "http:\n  server:\n    port: 8080\n  health:\n    enabled: true\n",
    );
    let override_path = dir.write("env/override.json", r#"{"http":{"server":{"port":9191}}}"#);

    let env = HashMap::from([(
        CONFIGURATION_ENV.to_string(),
        override_path.display().to_string(),
    )]);
    let app = Application::builder()
        .configuration_loader(dir.loader().environment(env).build())
        .build();

    let context = app.create().await.unwrap();
    assert_eq!(context.config().get_i64("/http/server/port"), Some(9191));
    assert!(context.config().get_bool("/http/health/enabled"));
}

#[tokio::test]
async fn test_configuration_failure_creates_no_runtime() {
    let dir = ConfigDir::new();
    dir.write("application.json", "{ broken");

    let app = Application::builder()
        .configuration_loader(dir.loader().build())
        .build();

    assert!(matches!(
        app.create().await,
        Err(ApplicationError::Configuration(_))
    ));
    assert!(app.runtime().is_none());
    app.close().await.unwrap();
}

#[tokio::test]
async fn test_units_see_configuration() {
    let log = EventLog::default();
    let unit_log = log.clone();
    let app = Application::builder()
        .configuration_loader(
            ConfigurationLoader::builder()
                .disable_feature(launchpad_core::Feature::ClasspathConfig)
                .environment(HashMap::<String, String>::new())
                .add_store(launchpad_core::ConfigStore::json(
                    serde_json::json!({ "unit": { "name": "FromConfig" } }),
                ))
                .build(),
        )
        .unit_configurer(move |_: Runtime, _: InitializationContext, config: ConfigTree| {
            let name = config.get_str_or("/unit/name", "Default").to_string();
            Ok::<_, anyhow::Error>(Box::new(MockUnit::new(name, &unit_log)) as Box<dyn Deployable>)
        })
        .build();

    app.create().await.unwrap();
    assert_eq!(log.entries(), vec!["start:FromConfig"]);
}

// ============================================================================
// Close
// ============================================================================

#[tokio::test]
async fn test_close_is_idempotent() {
    let log = EventLog::default();
    let app = Application::builder()
        .unit_configurer(mock("Unit", &log))
        .build();

    app.create().await.unwrap();
    app.close().await.unwrap();
    app.close().await.unwrap();
    assert_eq!(log.entries(), vec!["start:Unit", "stop:Unit"]);
}
