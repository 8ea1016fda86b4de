use crate::cache::RenditionCache;
use crate::config::ImageGateConfig;
use crate::resolve::ResolvedSource;
use crate::storage::Storage;
use crate::transform::params::RenditionParams;
use crate::transform::TransformEngine;
use crate::ImageGateError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Whether a rendition came out of the cache. Absent for originals served
/// without transformation, which bypass the cache entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// A resolved response body: the bytes to serve plus where they came from.
#[derive(Debug)]
pub struct Rendition {
    pub bytes: Vec<u8>,
    /// File the bytes were read from; used for content-type detection.
    pub file_path: PathBuf,
    pub cache: Option<CacheStatus>,
}

/// Orchestrates cache lookup, transform invocation and persistence for one
/// resolved source.
///
/// Concurrency: no locks. Concurrent first requests for the same key race
/// benignly: directory creation tolerates pre-existence, and racing writers
/// produce identical bytes behind an atomic rename, so at-most-one-miss-cost
/// per key is best-effort rather than guaranteed.
pub struct Materializer {
    storage: Arc<dyn Storage>,
    cache: RenditionCache,
    engine: Arc<dyn TransformEngine>,
    config: Arc<ImageGateConfig>,
}

impl Materializer {
    pub fn new(
        storage: Arc<dyn Storage>,
        cache: RenditionCache,
        engine: Arc<dyn TransformEngine>,
        config: Arc<ImageGateConfig>,
    ) -> Self {
        Self {
            storage,
            cache,
            engine,
            config,
        }
    }

    pub async fn materialize(
        &self,
        source: &ResolvedSource,
        raw_params: BTreeMap<String, String>,
    ) -> Result<Rendition, ImageGateError> {
        // No transformation parameters: serve the original bytes untouched,
        // with no cache entry and no hit/miss indicator.
        if raw_params.is_empty() {
            return self.serve_original(source).await;
        }

        let mut params = RenditionParams::new(raw_params);
        params.expand_preset(&self.config);
        if params.is_empty() {
            return self.serve_original(source).await;
        }
        params.rewrite_watermark(self.storage.as_ref());

        let key = self
            .cache
            .derive_key(source.backend(), source.path(), &params);

        match self.cache.lookup(&key).await {
            Ok(Some(bytes)) => {
                tracing::debug!(key = key.hash(), "cache hit");
                return Ok(Rendition {
                    bytes,
                    file_path: self.cache.entry_path(&key),
                    cache: Some(CacheStatus::Hit),
                });
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, key = key.hash(), "cache lookup failed, regenerating");
            }
        }

        if let Err(e) = self.cache.ensure_dir(&key).await {
            // Pre-existence races are filtered out by ensure_dir; anything
            // that reaches here is unexpected, but the request still
            // proceeds and the persist step reports the definitive failure.
            tracing::error!(error = %ImageGateError::CacheDirectory(e), key = key.hash(), "cache directory creation failed");
        }

        let source_abs = self.storage.absolute_path(source.backend(), source.path());
        match self.engine.render(&source_abs, &params).await {
            Ok(bytes) => {
                if let Err(e) = self.cache.persist(&key, &bytes).await {
                    tracing::warn!(error = %e, key = key.hash(), "failed to persist rendition, serving uncached");
                }
                Ok(Rendition {
                    bytes,
                    file_path: self.cache.entry_path(&key),
                    cache: Some(CacheStatus::Miss),
                })
            }
            Err(e) if source.is_fallback() => {
                // A broken default image must not fail the request; degrade
                // to serving it unmodified.
                tracing::warn!(
                    error = %e,
                    path = source.path(),
                    params = %params.canonical(),
                    "transform of fallback image failed, serving original"
                );
                self.serve_original(source).await
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    path = source.path(),
                    params = %params.canonical(),
                    "transform failed"
                );
                Err(ImageGateError::Transform(e))
            }
        }
    }

    async fn serve_original(&self, source: &ResolvedSource) -> Result<Rendition, ImageGateError> {
        let path = self.storage.absolute_path(source.backend(), source.path());
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Rendition {
                bytes,
                file_path: path,
                cache: None,
            }),
            // Vanished between resolution and read: surface like a missing
            // source so the client sees a 404 rather than a 500.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ImageGateError::StaleRead(source.path().to_string()))
            }
            Err(e) => Err(ImageGateError::Io(e)),
        }
    }
}
