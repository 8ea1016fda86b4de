use crate::storage::Backend;
use crate::transform::params::RenditionParams;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Storage address of one rendition.
///
/// The file name concatenates the parameter hash with the source basename to
/// keep cache entries traceable back to their source; the directory mirrors
/// the source path's directory under a per-backend root so entries from
/// different backends or directories can never collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    hash: String,
    relative_path: PathBuf,
}

impl CacheKey {
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Path of the entry relative to the cache root.
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }
}

/// Filesystem-backed rendition cache.
///
/// Entries are immutable once written: a changed parameter set derives a new
/// key rather than overwriting an existing entry. Concurrent writers for the
/// same key produce identical bytes, so redundant writes are harmless.
#[derive(Debug, Clone)]
pub struct RenditionCache {
    root: PathBuf,
}

impl RenditionCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Derive the deterministic cache key for a (backend, path, params)
    /// triple. Params must already be normalized; determinism here is the
    /// entire cache-correctness invariant.
    pub fn derive_key(&self, backend: Backend, path: &str, params: &RenditionParams) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(params.canonical().as_bytes());
        let hash = hex::encode(hasher.finalize());

        let source = Path::new(path);
        let basename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".into());

        let mut relative_path = PathBuf::from(backend.as_str());
        if let Some(parent) = source.parent() {
            relative_path.push(parent);
        }
        relative_path.push(format!("{}_{}", hash, basename));

        CacheKey {
            hash,
            relative_path,
        }
    }

    /// Absolute path of the entry for `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(&key.relative_path)
    }

    /// Read a cached rendition. A missing entry is a miss, not an error; an
    /// entry that vanishes between check and read surfaces as a miss too and
    /// the caller simply regenerates it.
    pub async fn lookup(&self, key: &CacheKey) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.entry_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create the entry's directory. Concurrent first requests for the same
    /// key race to create it; pre-existence is not a failure.
    pub async fn ensure_dir(&self, key: &CacheKey) -> io::Result<()> {
        let path = self.entry_path(key);
        let Some(dir) = path.parent() else {
            return Ok(());
        };
        match fs::create_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Atomically persist rendition bytes: write to a tempfile in the final
    /// directory, then rename into place. A reader can never observe a
    /// partial entry, and racing writers of identical bytes overwrite each
    /// other without corruption.
    pub async fn persist(&self, key: &CacheKey, bytes: &[u8]) -> io::Result<PathBuf> {
        let final_path = self.entry_path(key);
        let dir = final_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "entry has no parent"))?;
        let bytes = bytes.to_vec();
        let target = final_path.clone();

        tokio::task::spawn_blocking(move || -> io::Result<()> {
            use std::io::Write;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

        Ok(final_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> RenditionParams {
        RenditionParams::new(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn key_is_deterministic_and_order_independent() {
        let cache = RenditionCache::new("/tmp/cache");
        let a = cache.derive_key(
            Backend::Public,
            "products/1.jpg",
            &params(&[("w", "600"), ("h", "400")]),
        );
        let b = cache.derive_key(
            Backend::Public,
            "products/1.jpg",
            &params(&[("h", "400"), ("w", "600")]),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn key_separates_backends_paths_and_params() {
        let cache = RenditionCache::new("/tmp/cache");
        let base = cache.derive_key(Backend::Public, "products/1.jpg", &params(&[("w", "600")]));
        let other_backend =
            cache.derive_key(Backend::Private, "products/1.jpg", &params(&[("w", "600")]));
        let other_path = cache.derive_key(Backend::Public, "users/1.jpg", &params(&[("w", "600")]));
        let other_params =
            cache.derive_key(Backend::Public, "products/1.jpg", &params(&[("w", "601")]));

        assert_ne!(base.relative_path(), other_backend.relative_path());
        assert_ne!(base.relative_path(), other_path.relative_path());
        assert_ne!(base.relative_path(), other_params.relative_path());
    }

    #[test]
    fn key_mirrors_source_directory() {
        let cache = RenditionCache::new("/tmp/cache");
        let key = cache.derive_key(Backend::Public, "products/summer/1.jpg", &params(&[("w", "600")]));
        let rel = key.relative_path().to_string_lossy().into_owned();
        assert!(rel.starts_with("public/products/summer/"));
        assert!(rel.ends_with("_1.jpg"));
        assert!(rel.contains(key.hash()));
    }

    #[tokio::test]
    async fn persist_then_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RenditionCache::new(dir.path());
        let key = cache.derive_key(Backend::Public, "products/1.jpg", &params(&[("w", "50")]));

        assert_eq!(cache.lookup(&key).await.unwrap(), None);
        cache.ensure_dir(&key).await.unwrap();
        cache.persist(&key, b"rendition-bytes").await.unwrap();
        assert_eq!(
            cache.lookup(&key).await.unwrap().as_deref(),
            Some(&b"rendition-bytes"[..])
        );
    }

    #[tokio::test]
    async fn ensure_dir_tolerates_repeats() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RenditionCache::new(dir.path());
        let key = cache.derive_key(Backend::Public, "a/b/c.png", &params(&[("w", "1")]));
        cache.ensure_dir(&key).await.unwrap();
        cache.ensure_dir(&key).await.unwrap();
    }
}
