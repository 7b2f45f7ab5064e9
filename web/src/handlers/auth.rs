//! Bearer-token authentication.
//!
//! [`JwtAuthLayer`] verifies the `Authorization: Bearer <token>` header with a
//! [`JwtAuthProvider`] and stores the [`User`] in request extensions, where
//! handlers read it through the [`AuthenticatedUser`] extractor.
//!
//! ```no_run
//! use axum::{Router, routing::get};
//! use launchpad_auth::JwtAuthProvider;
//! use launchpad_web::handlers::auth::{AuthenticatedUser, jwt_auth_layer};
//!
//! async fn me(AuthenticatedUser(user): AuthenticatedUser) -> String {
//!     user.subject().unwrap_or_default().to_string()
//! }
//!
//! # fn router(provider: JwtAuthProvider) -> Router {
//! Router::new()
//!     .route("/me", get(me))
//!     .layer(jwt_auth_layer(provider))
//! # }
//! ```

use crate::error::AppError;
use axum::async_trait;
use axum::extract::{FromRequestParts, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use launchpad_auth::{JwtAuthProvider, User};
use std::convert::Infallible;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Create a [`JwtAuthLayer`].
#[must_use]
pub fn jwt_auth_layer(provider: JwtAuthProvider) -> JwtAuthLayer {
    JwtAuthLayer { provider }
}

/// Layer rejecting requests without a valid bearer token.
#[derive(Clone, Debug)]
pub struct JwtAuthLayer {
    provider: JwtAuthProvider,
}

impl<S> Layer<S> for JwtAuthLayer {
    type Service = JwtAuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        JwtAuthMiddleware {
            inner,
            provider: self.provider.clone(),
        }
    }
}

/// Service produced by [`JwtAuthLayer`].
#[derive(Clone, Debug)]
pub struct JwtAuthMiddleware<S> {
    inner: S,
    provider: JwtAuthProvider,
}

impl<S> Service<Request> for JwtAuthMiddleware<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        // The readied service handles this request; the clone waits for the next one.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let provider = self.provider.clone();

        Box::pin(async move {
            let Some(token) = bearer_token(req.headers()) else {
                return Ok(AppError::unauthorized("Missing bearer token.").into_response());
            };

            match provider.authenticate(&token).await {
                Ok(user) => {
                    tracing::debug!(subject = user.subject(), "Request authenticated");
                    req.extensions_mut().insert(user);
                    inner.call(req).await
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Request rejected");
                    Ok(AppError::from(e).into_response())
                }
            }
        })
    }
}

fn bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// The user authenticated by [`JwtAuthLayer`].
///
/// Rejects with 401 on routes the layer does not cover.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(Self)
            .ok_or_else(|| AppError::unauthorized("Request is not authenticated."))
    }
}
