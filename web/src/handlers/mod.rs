//! Built-in router handlers and middleware.

pub mod auth;
pub mod health;
pub mod logging;
pub mod metrics;

pub use auth::{AuthenticatedUser, JwtAuthLayer, jwt_auth_layer};
pub use health::{DefaultHealthCheckHandler, HealthCheckHandler, HealthReport};
pub use logging::{ContextualLoggingHandler, RequestLoggingHandler, TraceContext};
pub use metrics::MetricsHandler;
