use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;
use tokio::fs;

/// A named storage area containing source images.
///
/// `Public` holds web-facing assets; `Private` holds assets that are only
/// reachable through the gateway (e.g. fallback images shipped with the
/// application).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Public,
    Private,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Public => "public",
            Backend::Private => "private",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(Backend::Public),
            "private" | "local" => Ok(Backend::Private),
            _ => Err(format!("Invalid backend: {}", s)),
        }
    }
}

/// Filesystem collaborator behind the gateway.
///
/// Backend-scoped operations (`exists`, `absolute_path`) address source
/// images by logical path; the remaining operations work on absolute paths
/// and are what the sweep tool runs on.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Absolute location of a logical path on a backend. Pure path
    /// arithmetic; the file need not exist.
    fn absolute_path(&self, backend: Backend, path: &str) -> PathBuf;

    async fn exists(&self, backend: Backend, path: &str) -> bool;

    /// All regular files under `dir`, recursively.
    async fn list_files(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>>;

    async fn last_modified(&self, path: &Path) -> std::io::Result<SystemTime>;

    async fn delete(&self, path: &Path) -> std::io::Result<()>;

    async fn delete_dir(&self, path: &Path) -> std::io::Result<()>;
}

/// Local-disk storage with one root directory per backend.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    public_root: PathBuf,
    private_root: PathBuf,
}

impl DiskStorage {
    pub fn new(public_root: impl Into<PathBuf>, private_root: impl Into<PathBuf>) -> Self {
        Self {
            public_root: public_root.into(),
            private_root: private_root.into(),
        }
    }

    fn root(&self, backend: Backend) -> &Path {
        match backend {
            Backend::Public => &self.public_root,
            Backend::Private => &self.private_root,
        }
    }
}

#[async_trait::async_trait]
impl Storage for DiskStorage {
    fn absolute_path(&self, backend: Backend, path: &str) -> PathBuf {
        self.root(backend).join(path.trim_start_matches('/'))
    }

    async fn exists(&self, backend: Backend, path: &str) -> bool {
        match fs::metadata(self.absolute_path(backend, path)).await {
            Ok(meta) => meta.is_file(),
            Err(_) => false,
        }
    }

    async fn list_files(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let mut entries = fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let ty = entry.file_type().await?;
                if ty.is_dir() {
                    pending.push(entry.path());
                } else if ty.is_file() {
                    files.push(entry.path());
                }
            }
        }
        Ok(files)
    }

    async fn last_modified(&self, path: &Path) -> std::io::Result<SystemTime> {
        fs::metadata(path).await?.modified()
    }

    async fn delete(&self, path: &Path) -> std::io::Result<()> {
        fs::remove_file(path).await
    }

    async fn delete_dir(&self, path: &Path) -> std::io::Result<()> {
        fs::remove_dir_all(path).await
    }
}
