use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;

pub mod cache;
pub mod config;
pub mod materialize;
pub mod resolve;
pub mod response;
pub mod storage;
pub mod sweep;
pub mod transform;
pub mod urls;

use crate::cache::RenditionCache;
use crate::config::ImageGateConfig;
use crate::materialize::{CacheStatus, Materializer, Rendition};
use crate::resolve::{sanitize_path, SourceResolver};
use crate::storage::{Backend, DiskStorage, Storage};
use crate::transform::{ImageEngine, TransformEngine, TransformError};

#[derive(Error, Debug)]
pub enum ImageGateError {
    #[error("Source not found: {0}")]
    SourceNotFound(String),
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),
    #[error("Cache directory error: {0}")]
    CacheDirectory(#[source] std::io::Error),
    #[error("Source vanished before read: {0}")]
    StaleRead(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, ImageGateError>;

impl IntoResponse for ImageGateError {
    fn into_response(self) -> Response {
        let status = match &self {
            // A vanished file is indistinguishable from a missing one to
            // the client.
            ImageGateError::SourceNotFound(_) | ImageGateError::StaleRead(_) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// The assembled request-to-rendition pipeline. All collaborators are
/// constructed explicitly at startup and injected; there is no ambient
/// configuration lookup anywhere below this type.
pub struct Gateway {
    config: Arc<ImageGateConfig>,
    resolver: SourceResolver,
    materializer: Materializer,
}

impl Gateway {
    /// Build a gateway over local-disk storage with the built-in transform
    /// engine.
    pub fn new(config: ImageGateConfig) -> Self {
        let config = Arc::new(config);
        let storage: Arc<dyn Storage> = Arc::new(DiskStorage::new(
            config.public_root.clone(),
            config.private_root.clone(),
        ));
        let engine: Arc<dyn TransformEngine> = Arc::new(ImageEngine::new(
            config.default_quality,
            config.default_fit,
            config.default_format,
        ));
        Self::with_parts(config, storage, engine)
    }

    /// Build a gateway from explicit collaborators. Used by tests to swap
    /// the storage or engine implementation.
    pub fn with_parts(
        config: Arc<ImageGateConfig>,
        storage: Arc<dyn Storage>,
        engine: Arc<dyn TransformEngine>,
    ) -> Self {
        let resolver = SourceResolver::new(storage.clone(), config.fallback_images.clone());
        let cache = RenditionCache::new(config.cache_root.clone());
        let materializer = Materializer::new(storage, cache, engine, config.clone());
        Self {
            config,
            resolver,
            materializer,
        }
    }

    pub fn config(&self) -> &ImageGateConfig {
        &self.config
    }

    /// Run the full pipeline for one request: sanitize, resolve (with
    /// fallback), materialize.
    pub async fn serve(
        &self,
        raw_path: &str,
        params: BTreeMap<String, String>,
    ) -> Result<Rendition> {
        let path = sanitize_path(raw_path)
            .ok_or_else(|| ImageGateError::SourceNotFound(raw_path.to_string()))?;
        // Images reached through the HTTP route always live on the public
        // backend; the private backend only participates in fallback probes.
        let source = self.resolver.resolve(&path, Backend::Public).await?;
        self.materializer.materialize(&source, params).await
    }
}

async fn show(
    State(gate): State<Arc<Gateway>>,
    UrlPath(path): UrlPath<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    tracing::debug!(path = %path, params = params.len(), "image request");

    match gate.serve(&path, params).await {
        Ok(rendition) => {
            match rendition.cache {
                Some(CacheStatus::Hit) => {
                    METRICS.cache_hits.fetch_add(1, Ordering::Relaxed);
                }
                Some(CacheStatus::Miss) => {
                    METRICS.cache_misses.fetch_add(1, Ordering::Relaxed);
                    METRICS.transforms.fetch_add(1, Ordering::Relaxed);
                }
                None => {}
            }
            response::build(rendition)
        }
        Err(e) => {
            METRICS.errors.fetch_add(1, Ordering::Relaxed);
            e.into_response()
        }
    }
}

/// Request counters exposed on `/metrics`.
pub struct Metrics {
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub transforms: AtomicU64,
    pub errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            transforms: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    static ref METRICS: Metrics = Metrics::new();
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    use serde_json::json;

    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "imagegate"
    }))
}

/// Metrics endpoint (Prometheus-compatible plain text)
async fn metrics_handler() -> impl IntoResponse {
    let hits = METRICS.cache_hits.load(Ordering::Relaxed);
    let misses = METRICS.cache_misses.load(Ordering::Relaxed);
    let transforms = METRICS.transforms.load(Ordering::Relaxed);
    let errors = METRICS.errors.load(Ordering::Relaxed);

    let metrics = format!(
        "# HELP imagegate_cache_hits_total Total number of cache hits\n\
         # TYPE imagegate_cache_hits_total counter\n\
         imagegate_cache_hits_total {}\n\
         # HELP imagegate_cache_misses_total Total number of cache misses\n\
         # TYPE imagegate_cache_misses_total counter\n\
         imagegate_cache_misses_total {}\n\
         # HELP imagegate_transforms_total Total number of image transformations\n\
         # TYPE imagegate_transforms_total counter\n\
         imagegate_transforms_total {}\n\
         # HELP imagegate_errors_total Total number of errors\n\
         # TYPE imagegate_errors_total counter\n\
         imagegate_errors_total {}\n",
        hits, misses, transforms, errors
    );

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics,
    )
}

/// Build the gateway router: the catch-all image route under the configured
/// prefix plus the observability endpoints.
pub fn router(config: ImageGateConfig) -> Router {
    router_with(Arc::new(Gateway::new(config)))
}

/// Build a router around an already-assembled gateway.
pub fn router_with(gate: Arc<Gateway>) -> Router {
    let prefix = gate.config().route_prefix.trim_matches('/').to_string();
    let image_route = format!("/{}/*path", prefix);

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route(&image_route, get(show).with_state(gate))
        .layer(TraceLayer::new_for_http())
}
