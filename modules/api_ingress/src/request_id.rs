//! Request ids and the per-request tracing span.
//!
//! `SetRequestIdLayer` runs outside the trace layer, so by the time a span is
//! opened every request carries an `x-request-id` header. The pipeline reads
//! the same header into `context.request_id`.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, MatchedPath};
use axum::http::{HeaderMap, HeaderName, Request, Response};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::request_id::{MakeRequestId, RequestId};
use tower_http::trace::{DefaultOnRequest, MakeSpan, OnResponse, TraceLayer};
use tracing::field::Empty;
use tracing::Span;

const UNSET: &str = "-";

pub fn header() -> HeaderName {
    HeaderName::from_static("x-request-id")
}

/// Request id carried by `headers`, if any.
pub fn from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header())
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Fills in a nanoid when the caller sent no `x-request-id`.
#[derive(Clone, Copy, Default)]
pub struct NanoRequestId;

impl MakeRequestId for NanoRequestId {
    fn make_request_id<B>(&mut self, _req: &Request<B>) -> Option<RequestId> {
        nanoid::nanoid!().parse().ok().map(RequestId::new)
    }
}

/// Opens `http_request` with the mounted route pattern rather than the raw
/// URI, so spans for `/users/1` and `/users/2` group together.
#[derive(Clone, Copy, Default)]
pub struct RouteSpan;

impl<B> MakeSpan<B> for RouteSpan {
    fn make_span(&mut self, req: &Request<B>) -> Span {
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map_or(UNSET, MatchedPath::as_str);
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let request_id = from_headers(req.headers());

        tracing::info_span!(
            "http_request",
            method = %req.method(),
            route,
            path = %req.uri().path(),
            peer = peer.as_deref().unwrap_or(UNSET),
            request_id = request_id.as_deref().unwrap_or(UNSET),
            status = Empty,
            latency_ms = Empty,
        )
    }
}

/// Records the outcome on the request span.
#[derive(Clone, Copy, Default)]
pub struct RecordOutcome;

impl<B> OnResponse<B> for RecordOutcome {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status().as_u16();
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        span.record("status", status);
        span.record("latency_ms", latency_ms);
        if status >= 500 {
            tracing::warn!(parent: span, status, latency_ms, "request failed");
        } else {
            tracing::debug!(parent: span, status, latency_ms, "request finished");
        }
    }
}

pub type HttpTraceLayer =
    TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RouteSpan, DefaultOnRequest, RecordOutcome>;

pub fn trace_layer() -> HttpTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(RouteSpan)
        .on_response(RecordOutcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn empty_header_counts_as_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(from_headers(&headers), None);

        headers.insert(header(), HeaderValue::from_static(""));
        assert_eq!(from_headers(&headers), None);

        headers.insert(header(), HeaderValue::from_static("req-7"));
        assert_eq!(from_headers(&headers).as_deref(), Some("req-7"));
    }

    #[test]
    fn generated_ids_are_distinct_header_values() {
        let req = Request::new(());
        let a = NanoRequestId.make_request_id(&req).unwrap();
        let b = NanoRequestId.make_request_id(&req).unwrap();
        assert_ne!(a.header_value(), b.header_value());
        assert!(!a.header_value().is_empty());
    }
}
