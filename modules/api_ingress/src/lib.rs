//! HTTP host for routespec pipelines.
//!
//! Owns the `axum` server: mounts every route pipeline, serves the generated
//! API document (`<base>/openapi.json`, `<base>/openapi.yaml`) with its viewer
//! pages, and applies the shared tower-http layers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use arc_swap::ArcSwap;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use routespec::{
    DocumentAssembler, DocumentError, ErrorBody, FrozenRegistry, Pipeline, RegistryHandle,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
};

mod config;
pub mod mount;
pub mod request_id;
mod web;

pub use config::{normalize_base, ApiIngressConfig};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ApiIngress {
    config: ArcSwap<ApiIngressConfig>,
    registry: RegistryHandle,
    pipelines: Vec<Pipeline>,
    assembler: DocumentAssembler,
    request_timeout: Duration,
}

impl ApiIngress {
    /// Host for `pipelines`, documenting the routes in `registry`.
    ///
    /// Additional documents listed in the config are fetched over HTTP.
    pub fn new(
        config: ApiIngressConfig,
        registry: FrozenRegistry,
        pipelines: Vec<Pipeline>,
    ) -> Result<Self> {
        let assembler = DocumentAssembler::http(&config.docs)?;
        Ok(Self::with_assembler(config, registry, pipelines, assembler))
    }

    pub fn with_assembler(
        config: ApiIngressConfig,
        registry: FrozenRegistry,
        pipelines: Vec<Pipeline>,
        assembler: DocumentAssembler,
    ) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            registry: RegistryHandle::new(registry),
            pipelines,
            assembler,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn get_config(&self) -> Arc<ApiIngressConfig> {
        self.config.load_full()
    }

    /// Takes effect for documents generated afterwards; the router keeps its layers.
    pub fn update_config(&self, config: ApiIngressConfig) {
        self.config.store(Arc::new(config));
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    pub fn routes(&self) -> &[Pipeline] {
        &self.pipelines
    }

    /// Generates the API document for the currently published registry.
    pub async fn openapi_document(&self) -> Result<Value, DocumentError> {
        let registry = self.registry.load();
        let config = self.get_config();
        self.assembler.generate(&registry, &config.docs).await
    }

    pub fn build_router(self: &Arc<Self>) -> Router {
        let config = self.get_config();
        let mut router = Router::new().route("/health", get(web::health_check));

        router = mount::mount_pipelines(router, self.pipelines.iter().cloned());

        if config.enable_docs {
            router = router.merge(self.docs_router(&config));
        }

        // Outermost to innermost:
        // PropagateRequestId -> SetRequestId -> Trace -> Timeout -> CORS -> BodyLimit
        let x_request_id = request_id::header();
        router = router.layer(RequestBodyLimitLayer::new(config.body_limit_bytes));
        if config.cors_enabled {
            router = router.layer(CorsLayer::permissive());
        }
        router = router.layer(TimeoutLayer::new(self.request_timeout));
        router = router.layer(request_id::trace_layer());
        router = router.layer(SetRequestIdLayer::new(
            x_request_id.clone(),
            request_id::NanoRequestId,
        ));
        router = router.layer(PropagateRequestIdLayer::new(x_request_id));

        tracing::debug!(
            routes = self.pipelines.len(),
            docs = config.enable_docs,
            "router built"
        );
        router
    }

    fn docs_router(self: &Arc<Self>, config: &ApiIngressConfig) -> Router {
        let base = config.docs_base();
        let spec_url = format!("{base}/openapi.json");

        let scalar = web::scalar_page(
            &spec_url,
            config.docs.title.as_deref(),
            config.docs.description.as_deref(),
        );
        let redoc = web::redoc_page(&spec_url);

        Router::new()
            .route(&spec_url, get(serve_json))
            .route(&format!("{base}/openapi.yaml"), get(serve_yaml))
            .route(
                &format!("{base}/openapi"),
                get(move || {
                    let page = scalar.clone();
                    async move { page }
                }),
            )
            .route(
                &format!("{base}/openapi/redoc"),
                get(move || {
                    let page = redoc.clone();
                    async move { page }
                }),
            )
            .with_state(Arc::clone(self))
    }

    /// Binds `bind_addr` and serves until `cancel` fires.
    pub async fn serve(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let cfg = self.get_config();
        let addr: SocketAddr = cfg
            .bind_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", cfg.bind_addr, e))?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP server bound on {}", addr);
        self.serve_with_listener(listener, cancel).await
    }

    pub async fn serve_with_listener(
        self: Arc<Self>,
        listener: tokio::net::TcpListener,
        cancel: CancellationToken,
    ) -> Result<()> {
        let router = self.build_router();

        let shutdown = async move {
            cancel.cancelled().await;
            tracing::info!("HTTP server shutting down gracefully (cancellation)");
        };

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }
}

async fn serve_json(State(ingress): State<Arc<ApiIngress>>) -> axum::response::Response {
    match ingress.openapi_document().await {
        Ok(document) => web::json_document(document),
        Err(e) => document_failure(e),
    }
}

async fn serve_yaml(State(ingress): State<Arc<ApiIngress>>) -> axum::response::Response {
    match ingress.openapi_document().await {
        Ok(document) => web::yaml_document(&document),
        Err(e) => document_failure(e),
    }
}

fn document_failure(e: DocumentError) -> axum::response::Response {
    tracing::error!(error = %e, "failed to generate the API document");
    ErrorBody::from_status(500).into_response()
}
