//! Transparent response caching for JSON routes.
//!
//! Wraps a route so reads are served from the cache when possible. Each
//! request runs a two-step state machine: probe the cache under the request
//! path (query string included); on a hit, answer from the cache without
//! calling the inner service; on a miss, call the inner service, buffer the
//! JSON body it produced, write it back through the cache, and forward the
//! body unchanged to the client. The response is always delivered even when
//! the cache write fails, and a failing probe falls through to an uncached
//! pass-through — the cache is never the reason a request fails.
//!
//! Two response shapes are supported: [`CacheLayer::new`] caches any 2xx
//! JSON body as-is; [`CacheLayer::enveloped`] expects `{success, data}`
//! envelopes and only caches those with `success == true`.

use crate::query::{Lookup, QueryCache};
use axum::Json;
use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use serde_json::Value;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};
use tracing::{debug, error, warn};

/// Shape of the response bodies the wrapped routes produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseShape {
    /// The body is the payload itself; any 2xx JSON body is cached.
    Bare,
    /// The body is a `{success, data}` envelope; cached only when
    /// `success` is true.
    Envelope,
}

#[derive(Clone)]
pub struct CacheLayer {
    cache: QueryCache,
    ttl: Duration,
    shape: ResponseShape,
}

impl CacheLayer {
    /// Cache bare JSON bodies under the request path for `ttl`.
    pub fn new(cache: QueryCache, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            shape: ResponseShape::Bare,
        }
    }

    /// Cache `{success, data}` envelope bodies, skipping unsuccessful ones.
    pub fn enveloped(cache: QueryCache, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            shape: ResponseShape::Envelope,
        }
    }
}

impl<S> Layer<S> for CacheLayer {
    type Service = CacheService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CacheService {
            inner,
            cache: self.cache.clone(),
            ttl: self.ttl,
            shape: self.shape,
        }
    }
}

#[derive(Clone)]
pub struct CacheService<S> {
    inner: S,
    cache: QueryCache,
    ttl: Duration,
    shape: ResponseShape,
}

impl<S> Service<Request> for CacheService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let cache = self.cache.clone();
        let ttl = self.ttl;
        let shape = self.shape;

        // Take the service that was driven to readiness, leave the clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            // Path plus query string uniquely identifies the cached query.
            let key = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_owned())
                .unwrap_or_else(|| req.uri().path().to_owned());

            match cache.probe(&key).await {
                Lookup::Hit(value) => {
                    debug!(key, "serving cached response");
                    return Ok(Json(value).into_response());
                }
                Lookup::Miss => {}
                Lookup::Failed => {
                    warn!(key, "cache probe failed, serving uncached");
                    return inner.call(req).await;
                }
            }

            let response = inner.call(req).await?;
            Ok(capture_and_store(&cache, &key, ttl, shape, response).await)
        })
    }
}

/// Buffer the inner response body, write it back to the cache when it
/// qualifies, and rebuild the response from the captured bytes. The client
/// receives the body unchanged whatever the cache write does.
async fn capture_and_store(
    cache: &QueryCache,
    key: &str,
    ttl: Duration,
    shape: ResponseShape,
    response: Response,
) -> Response {
    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            // The body stream broke; nothing left to forward.
            error!(key, error = %err, "failed to buffer response body");
            return Response::from_parts(parts, Body::empty());
        }
    };

    if parts.status.is_success() && is_json(&parts.headers) {
        if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
            if cacheable(shape, &value) {
                // Re-running the lookup re-misses (nothing wrote this key
                // since the probe, barring a concurrent request) and
                // persists the body as a side effect of the producer path.
                let outcome = cache
                    .fetch_with(key, ttl, move || async move { Ok(value) })
                    .await;
                if outcome == Lookup::Failed {
                    warn!(key, "response served but not cached");
                }
            } else {
                debug!(key, "unsuccessful envelope, not cached");
            }
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn is_json(headers: &http::HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

fn cacheable(shape: ResponseShape, value: &Value) -> bool {
    match shape {
        ResponseShape::Bare => true,
        ResponseShape::Envelope => value
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}
