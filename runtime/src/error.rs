//! Error types for the runtime and the bootstrap pipeline.

use crate::runtime::DeploymentId;
use thiserror::Error;

/// Errors raised by a [`Runtime`](crate::Runtime).
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The metrics recorder could not be installed
    #[error("Failed to install metrics recorder: {0}")]
    Metrics(String),

    /// A unit was submitted after the runtime was closed
    #[error("Runtime is closed")]
    Closed,

    /// A unit failed to start
    #[error("Unit '{name}' failed to start")]
    StartFailed {
        /// Unit name
        name: String,
        /// Cause reported by the unit
        #[source]
        source: anyhow::Error,
    },

    /// Units did not stop within the shutdown timeout
    #[error("Shutdown timed out waiting for units: {}", .0.join(", "))]
    ShutdownTimeout(Vec<String>),
}

/// Outcome of deploying one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentResult {
    /// Unit name
    pub name: String,
    /// Handle of the deployment, when it started
    pub deployment_id: Option<DeploymentId>,
    /// Whether the unit started
    pub success: bool,
    /// Failure cause, when it did not
    pub error: Option<String>,
}

impl DeploymentResult {
    /// A started unit.
    #[must_use]
    pub const fn succeeded(name: String, deployment_id: DeploymentId) -> Self {
        Self {
            name,
            deployment_id: Some(deployment_id),
            success: true,
            error: None,
        }
    }

    /// A unit that failed to start.
    #[must_use]
    pub const fn failed(name: String, error: String) -> Self {
        Self {
            name,
            deployment_id: None,
            success: false,
            error: Some(error),
        }
    }
}

/// At least one unit failed to start.
///
/// Carries the result of every unit, successful ones included.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Some units were not started successfully: {}", failed_list(.results))]
pub struct DeploymentError {
    /// Result of every unit, in registration order
    pub results: Vec<DeploymentResult>,
}

impl DeploymentError {
    /// Results of the units that failed.
    pub fn failures(&self) -> impl Iterator<Item = &DeploymentResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Names of the units that failed.
    #[must_use]
    pub fn failed_names(&self) -> Vec<&str> {
        self.failures().map(|r| r.name.as_str()).collect()
    }
}

fn failed_list(results: &[DeploymentResult]) -> String {
    results
        .iter()
        .filter(|r| !r.success)
        .map(|r| r.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure of one bootstrap stage.
#[derive(Error, Debug)]
pub enum ApplicationError {
    /// Configuration could not be loaded
    #[error("Failed to load configuration")]
    Configuration(#[source] launchpad_core::Error),

    /// The runtime could not be created
    #[error("Failed to create runtime")]
    Runtime(#[source] RuntimeError),

    /// The initialization context configurer failed
    #[error("Failed to configure initialization context")]
    Context(#[source] anyhow::Error),

    /// The pre-deployment handler failed
    #[error("Pre-deployment handler failed")]
    PreHandler(#[source] anyhow::Error),

    /// One or more units failed to start
    #[error(transparent)]
    Deployment(#[from] DeploymentError),

    /// The post-deployment handler failed
    #[error("Post-deployment handler failed")]
    PostHandler(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_error_names_failed_units() {
        let error = DeploymentError {
            results: vec![
                DeploymentResult::succeeded("HttpServer".to_string(), DeploymentId::new()),
                DeploymentResult::failed("Worker".to_string(), "boom".to_string()),
                DeploymentResult::failed("Poller".to_string(), "bang".to_string()),
            ],
        };
        assert_eq!(
            error.to_string(),
            "Some units were not started successfully: Worker, Poller"
        );
        assert_eq!(error.failures().count(), 2);
    }

    #[test]
    fn test_stage_errors_keep_cause() {
        let error = ApplicationError::PreHandler(anyhow::anyhow!("database unreachable"));
        assert_eq!(error.to_string(), "Pre-deployment handler failed");

        // Each cause appears once in the rendered chain.
        let chain = format!("{:#}", anyhow::Error::from(error));
        assert_eq!(chain, "Pre-deployment handler failed: database unreachable");
    }
}
