//! Error types for the HTTP server unit and its handlers.
//!
//! [`AppError`] is the response-side error: it carries a status, a client
//! facing message and a stable code, and renders as a JSON body.
//! [`ServerError`] covers failures starting the server itself.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use launchpad_auth::AuthError;
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

/// Failures starting an [`HttpServerUnit`](crate::HttpServerUnit).
#[derive(Debug, Error)]
pub enum ServerError {
    /// `http.server.port` is not a valid TCP port.
    #[error("Invalid http server port: {0}")]
    InvalidPort(i64),

    /// The listener could not be bound.
    #[error("Failed to bind http server to {addr}")]
    Bind {
        /// Requested address
        addr: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A sub-router configurer failed, or the routes could not be assembled.
    #[error("Http server initialization failed while configuring routes")]
    Routes(#[source] anyhow::Error),

    /// `start` was called on a unit that is already serving.
    #[error("Http server already started on {0}")]
    AlreadyStarted(SocketAddr),
}

/// Error returned from request handlers and middleware.
///
/// # Examples
///
/// ```
/// use axum::http::StatusCode;
/// use launchpad_web::AppError;
///
/// let error = AppError::unauthorized("Invalid JWT issuer: other.");
/// assert_eq!(error.status(), StatusCode::UNAUTHORIZED);
/// assert_eq!(error.to_string(), "[UNAUTHORIZED] Invalid JWT issuer: other.");
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: &'static str,
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create an error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Attach the internal cause. It is logged, never sent to the client.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, "UNAUTHORIZED")
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_SERVER_ERROR")
    }

    /// 503 Service Unavailable.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message, "SERVICE_UNAVAILABLE")
    }

    /// HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Stable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Client-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse<'a> {
    code: &'a str,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

/// Rejected tokens become 401 with the provider's message; an unreachable
/// key set is 503; a misconfigured provider is 500.
impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            e if e.is_token_error() => Self::unauthorized(e.to_string()),
            e @ (AuthError::JwksStatus { .. } | AuthError::JwksFetch { .. }) => {
                Self::unavailable("Token keys are unavailable").with_source(e.into())
            }
            e => Self::internal("Authentication is misconfigured").with_source(e.into()),
        }
    }
}
