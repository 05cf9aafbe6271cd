//! Response cache middleware.
//!
//! Serves cached JSON payloads for GET requests and stores fresh ones on
//! the way out, marking every response with an `X-Cache: HIT`/`MISS`
//! header. Composes with whatever layers are stacked around it; the
//! downstream body is re-emitted unchanged after being recorded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::keys::derive_key;
use crate::store::{ResponseCache, SetOptions};

/// Response header carrying the cache outcome.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

// Responses larger than this are passed through uncached.
const MAX_CACHEABLE_BODY_BYTES: usize = 1024 * 1024;

/// Shared cache state for the middleware.
#[derive(Clone)]
pub struct CacheState {
    pub cache: Arc<ResponseCache>,
    /// TTL for entries stored by the middleware; `None` uses the
    /// configured default.
    pub ttl: Option<Duration>,
}

/// Middleware for response caching.
///
/// Only GET requests participate. The cache key is derived from the
/// request path and its canonicalized query parameters, so volatile
/// cache-buster parameters never fragment the key space. Only `200 OK`
/// JSON responses are stored.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(state): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let params = query_params(request.uri().query().unwrap_or(""));
    let key = derive_key(&path, &params);

    if let Some(value) = state.cache.get(&key) {
        debug!(outcome = "hit", key, "serving cached response");
        return build_cached_response(&value);
    }

    debug!(outcome = "miss", key, "cache miss, executing handler");
    let response = next.run(request).await;

    if response.status() != StatusCode::OK || !is_json(&response) {
        return mark_status(response, "MISS");
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CACHEABLE_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            // Body collection failed; nothing sensible left to emit.
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
        state.cache.set(&key, value, state.ttl, SetOptions::default());
    }

    parts
        .headers
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

/// Parse a raw query string into the parameter map fed to `derive_key`.
fn query_params(query: &str) -> HashMap<String, Option<String>> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(name, value)| (name.into_owned(), Some(value.into_owned())))
        .collect()
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

fn mark_status(mut response: Response, status: &'static str) -> Response {
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static(status));
    response
}

/// Build a response from a cached payload.
fn build_cached_response(value: &Value) -> Response {
    let Ok(body) = serde_json::to_vec(value) else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(CACHE_STATUS_HEADER, HeaderValue::from_static("HIT"))
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_params_parses_pairs() {
        let params = query_params("genre=action&page=2");
        assert_eq!(params.get("genre"), Some(&Some("action".to_string())));
        assert_eq!(params.get("page"), Some(&Some("2".to_string())));
    }

    #[test]
    fn query_params_decodes_percent_encoding() {
        let params = query_params("title=one%20punch");
        assert_eq!(params.get("title"), Some(&Some("one punch".to_string())));
    }

    #[test]
    fn empty_query_yields_no_params() {
        assert!(query_params("").is_empty());
    }

    #[test]
    fn cached_response_carries_hit_header() {
        let response = build_cached_response(&serde_json::json!({"ok": true}));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(CACHE_STATUS_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("HIT")
        );
    }
}
