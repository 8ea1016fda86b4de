use crate::storage::{Backend, Storage};
use crate::ImageGateError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Last-resort fallback when the configuration carries no usable mapping.
pub const LAST_RESORT_FALLBACK: &str = "defaults/no-image.jpg";

/// Outcome of source resolution. Fallback sources get a softer error policy
/// downstream: a broken default image must not fail the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    Primary { backend: Backend, path: String },
    Fallback { backend: Backend, path: String },
}

impl ResolvedSource {
    pub fn backend(&self) -> Backend {
        match self {
            ResolvedSource::Primary { backend, .. } | ResolvedSource::Fallback { backend, .. } => {
                *backend
            }
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ResolvedSource::Primary { path, .. } | ResolvedSource::Fallback { path, .. } => path,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ResolvedSource::Fallback { .. })
    }
}

/// Locates a source image, degrading to a category default when the
/// requested path is absent.
pub struct SourceResolver {
    storage: Arc<dyn Storage>,
    fallback_images: BTreeMap<String, String>,
}

impl SourceResolver {
    pub fn new(storage: Arc<dyn Storage>, fallback_images: BTreeMap<String, String>) -> Self {
        Self {
            storage,
            fallback_images,
        }
    }

    /// Resolve `path` on `backend`.
    ///
    /// Missing images degrade per content category: the first path segment
    /// selects a configured default image (a missing product photo shows a
    /// generic product placeholder), the `default` entry catches the rest,
    /// and a hard-coded path is the last resort. The fallback image is
    /// probed on the public backend first, then the private one.
    pub async fn resolve(
        &self,
        path: &str,
        backend: Backend,
    ) -> Result<ResolvedSource, ImageGateError> {
        if self.storage.exists(backend, path).await {
            return Ok(ResolvedSource::Primary {
                backend,
                path: path.to_string(),
            });
        }

        let category = path.split('/').next().unwrap_or("");
        let fallback = self
            .fallback_images
            .get(category)
            .or_else(|| self.fallback_images.get("default"))
            .map(String::as_str)
            .unwrap_or(LAST_RESORT_FALLBACK);

        tracing::debug!(path, category, fallback, "source missing, trying fallback");

        for probe in [Backend::Public, Backend::Private] {
            if self.storage.exists(probe, fallback).await {
                return Ok(ResolvedSource::Fallback {
                    backend: probe,
                    path: fallback.to_string(),
                });
            }
        }

        Err(ImageGateError::SourceNotFound(path.to_string()))
    }
}

/// Normalize a request path: strip the leading slash and reject traversal
/// or empty paths. Returns None for paths that cannot name a source image.
pub fn sanitize_path(raw: &str) -> Option<String> {
    let path = raw.trim_start_matches('/');
    if path.is_empty() || path.ends_with('/') {
        return None;
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return None;
    }
    Some(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_traversal() {
        assert_eq!(sanitize_path("/products/1.jpg"), Some("products/1.jpg".into()));
        assert_eq!(sanitize_path("products/../secret.jpg"), None);
        assert_eq!(sanitize_path("products//1.jpg"), None);
        assert_eq!(sanitize_path("./1.jpg"), None);
        assert_eq!(sanitize_path(""), None);
        assert_eq!(sanitize_path("products/"), None);
    }
}
