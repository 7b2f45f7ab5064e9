//! Axum HTTP server unit for Launchpad applications.
//!
//! [`HttpServerUnit`] is a [`Deployable`](launchpad_runtime::Deployable):
//! the orchestrator starts it like any other unit and the runtime stops it
//! on close. Its builder is a [`UnitConfigurer`](launchpad_runtime::UnitConfigurer),
//! so it can be handed straight to `Application::builder().unit_configurer(..)`.
//!
//! # Router Assembly
//!
//! ```text
//! RouterConfigurer ──► (prefix, Router) ─┐
//! RouterConfigurer ──► (prefix, Router) ─┼─► mounted in order
//!                                        │
//! RouterHandler (last registered) ───────┤   routes / layers
//! ...                                    │   applied on top,
//! RouterHandler (first registered) ──────┘   outermost last
//! ```
//!
//! # Built-in Handlers
//!
//! - [`HealthCheckHandler`]: `GET /health` when `http.health.enabled`
//! - [`MetricsHandler`]: Prometheus scrape route when metrics are enabled
//! - [`ContextualLoggingHandler`]: per-request span with B3 trace ids
//! - [`RequestLoggingHandler`]: request tracing and HTTP metrics
//! - [`jwt_auth_layer`]: bearer-token authentication

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;

pub use error::{AppError, ServerError};
pub use handlers::{
    AuthenticatedUser, ContextualLoggingHandler, DefaultHealthCheckHandler, HealthCheckHandler,
    JwtAuthLayer, MetricsHandler, RequestLoggingHandler, TraceContext, jwt_auth_layer,
};
pub use router::{RouterConfigurer, RouterHandler};
pub use server::{HttpServerOptions, HttpServerOptionsConfigurer, HttpServerUnit, HttpServerUnitBuilder};
