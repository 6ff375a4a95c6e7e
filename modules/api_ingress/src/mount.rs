//! Mounting of validation pipelines onto an `axum` router.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, RawPathParams, RawQuery},
    http::{HeaderMap, Uri},
    response::{IntoResponse, Response},
    routing::{on, MethodFilter, MethodRouter},
    Extension, Router,
};
use routespec::{
    schema::FieldError, HttpMethod, InputSource, Pipeline, PipelineError, PipelineRequest,
};

pub fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Delete => MethodFilter::DELETE,
        HttpMethod::Patch => MethodFilter::PATCH,
        HttpMethod::Head => MethodFilter::HEAD,
        HttpMethod::Options => MethodFilter::OPTIONS,
        HttpMethod::Trace => MethodFilter::TRACE,
    }
}

/// Method router answering `pipeline`'s method on its path.
pub fn method_router(pipeline: Pipeline) -> MethodRouter {
    let filter = method_filter(pipeline.schema().method);
    on(
        filter,
        move |peer: Option<Extension<ConnectInfo<SocketAddr>>>,
              params: RawPathParams,
              RawQuery(query): RawQuery,
              uri: Uri,
              headers: HeaderMap,
              body: Bytes| {
            let pipeline = pipeline.clone();
            let peer = peer.map(|Extension(ConnectInfo(addr))| addr);
            async move { dispatch(pipeline, peer, params, query, uri, headers, body).await }
        },
    )
}

/// Adds one route per distinct path, combining the methods registered on it.
pub fn mount_pipelines<I>(mut router: Router, pipelines: I) -> Router
where
    I: IntoIterator<Item = Pipeline>,
{
    let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();
    for pipeline in pipelines {
        let path = pipeline.schema().path.clone();
        tracing::debug!(
            method = %pipeline.schema().method,
            path = %path,
            "mounting route"
        );
        let route = method_router(pipeline);
        let merged = match by_path.remove(&path) {
            Some(existing) => existing.merge(route),
            None => route,
        };
        by_path.insert(path, merged);
    }
    for (path, route) in by_path {
        router = router.route(&path, route);
    }
    router
}

async fn dispatch(
    pipeline: Pipeline,
    peer: Option<SocketAddr>,
    params: RawPathParams,
    query: Option<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let method = pipeline.schema().method;
    let mut request = PipelineRequest::new(method, uri.path());

    for (name, value) in &params {
        request = request.path_param(name, value);
    }
    if let Some(query) = query {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            request = request.query_param(name, value);
        }
    }

    if method.carries_body() && !body.is_empty() {
        match serde_json::from_slice(&body) {
            Ok(value) => request = request.body(value),
            Err(e) => {
                tracing::warn!(path = %uri.path(), error = %e, "request body is not JSON");
                return PipelineError::RequestValidation {
                    location: InputSource::Body,
                    errors: vec![FieldError::root(format!("invalid JSON: {e}"))],
                }
                .to_body()
                .into_response();
            }
        }
    }

    // Peer IP only; the port changes with every connection.
    request.context.client = peer.map(|addr| addr.ip().to_string());
    request.context.request_id = crate::request_id::from_headers(&headers);
    request.context.headers = headers;

    pipeline.execute(request).await.into_response()
}
