use std::task::{Context, Poll};
use std::time::Instant;

use axum::http::{header::HeaderName, HeaderValue, Request, Response};
use tower::{Layer, Service};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::observability::metrics as obs;

// ---------------------------------------------------------------------------
// X-Request-Id middleware
// ---------------------------------------------------------------------------

/// Header name for request ID propagation.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Longest client-supplied request id that is reused as is.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Layer that tags every request with an `X-Request-Id` and logs it.
///
/// - A well-formed incoming `X-Request-Id` is reused, otherwise a UUIDv4 is
///   generated.
/// - The handler runs inside a `request` span carrying the id, method and
///   path; completion is logged with status and latency.
/// - The id is echoed on the response.
#[derive(Clone)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdMiddleware { inner }
    }
}

/// Middleware service that injects `X-Request-Id`.
#[derive(Clone)]
pub struct RequestIdMiddleware<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestIdMiddleware<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let request_id = req
            .headers()
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty() && s.len() <= MAX_REQUEST_ID_LEN)
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Ok(val) = HeaderValue::from_str(&request_id) {
            req.headers_mut().insert(X_REQUEST_ID.clone(), val);
        }

        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %method,
            path = %path
        );

        // Take the service that was driven to readiness, leave a fresh clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let start = Instant::now();

        Box::pin(
            async move {
                let mut response = inner.call(req).await?;

                let status = response.status().as_u16();
                let latency = start.elapsed();
                obs::inc_http_request(method.as_str(), status);
                obs::record_http_request_duration(latency.as_secs_f64());
                if status >= 500 {
                    warn!(status, latency_ms = latency.as_millis() as u64, "request failed");
                } else {
                    info!(status, latency_ms = latency.as_millis() as u64, "request completed");
                }

                if let Ok(val) = HeaderValue::from_str(&request_id) {
                    response.headers_mut().insert(X_REQUEST_ID.clone(), val);
                }

                Ok(response)
            }
            .instrument(span),
        )
    }
}
