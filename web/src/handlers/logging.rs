//! Request-scoped logging.
//!
//! - [`ContextualLoggingHandler`]: every request runs inside a span carrying
//!   `traceId`, `spanId` and `parentId`, taken from B3 headers or generated,
//!   so all events logged while handling it carry the trace context
//! - [`RequestLoggingHandler`]: `tower-http` request/response tracing plus
//!   request count and latency metrics
//!
//! # Flow
//!
//! 1. **Extract** `X-B3-TraceId`, `X-B3-SpanId`, `X-B3-ParentSpanId`
//! 2. **Generate** missing trace and span ids
//! 3. **Store** the [`TraceContext`] in request extensions
//! 4. **Run** the request inside the span

use crate::router::RouterHandler;
use axum::Router;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use launchpad_core::ConfigTree;
use launchpad_runtime::Runtime;
use launchpad_runtime::metrics::HttpMetrics;
use launchpad_runtime::options::{PARENT_ID_KEY, SPAN_ID_KEY, TRACE_ID_KEY};
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

/// B3 trace id header.
pub const B3_TRACE_ID: &str = "X-B3-TraceId";
/// B3 span id header.
pub const B3_SPAN_ID: &str = "X-B3-SpanId";
/// B3 parent span id header.
pub const B3_PARENT_SPAN_ID: &str = "X-B3-ParentSpanId";

/// Trace identifiers of the request being handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// 128-bit trace id, lowercase hex
    pub trace_id: String,
    /// 64-bit span id, lowercase hex
    pub span_id: String,
    /// Parent span id, when the caller sent one
    pub parent_id: Option<String>,
}

impl TraceContext {
    /// Read B3 headers, generating any missing trace or span id.
    #[must_use]
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            trace_id: header(B3_TRACE_ID).unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            span_id: header(B3_SPAN_ID).unwrap_or_else(new_span_id),
            parent_id: header(B3_PARENT_SPAN_ID),
        }
    }

    /// Entries as logged, keyed `traceId`, `spanId`, `parentId`.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        let mut entries = vec![
            (TRACE_ID_KEY, self.trace_id.as_str()),
            (SPAN_ID_KEY, self.span_id.as_str()),
        ];
        if let Some(parent) = &self.parent_id {
            entries.push((PARENT_ID_KEY, parent.as_str()));
        }
        entries
    }

    fn span(&self, request: &Request) -> tracing::Span {
        let span = tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            traceId = tracing::field::Empty,
            spanId = tracing::field::Empty,
            parentId = tracing::field::Empty,
        );
        for (key, value) in self.entries() {
            span.record(key, value);
        }
        span
    }
}

fn new_span_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

/// Layer wrapping every request in a span with its [`TraceContext`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceContextLayer;

impl<S> Layer<S> for TraceContextLayer {
    type Service = TraceContextMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceContextMiddleware { inner }
    }
}

/// Service produced by [`TraceContextLayer`].
#[derive(Clone, Debug)]
pub struct TraceContextMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for TraceContextMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let context = TraceContext::from_headers(req.headers());
        let span = context.span(&req);
        req.extensions_mut().insert(context);

        let fut = span.in_scope(|| self.inner.call(req));
        Box::pin(fut.instrument(span))
    }
}

/// Adds [`TraceContextLayer`] to the router.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextualLoggingHandler;

impl RouterHandler for ContextualLoggingHandler {
    fn apply(&self, _runtime: &Runtime, router: Router, _config: &ConfigTree) -> Router {
        router.layer(TraceContextLayer)
    }
}

/// Logs requests and responses and records request metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLoggingHandler;

impl RouterHandler for RequestLoggingHandler {
    fn apply(&self, _runtime: &Runtime, router: Router, _config: &ConfigTree) -> Router {
        router
            .layer(middleware::from_fn(record_request))
            .layer(TraceLayer::new_for_http())
    }
}

async fn record_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let started = Instant::now();
    let response = next.run(request).await;
    HttpMetrics::record_request(method.as_str(), response.status().as_u16(), started.elapsed());
    response
}
