use crate::storage::Storage;
use std::io;
use std::path::Path;
use time::OffsetDateTime;

/// Outcome of one cache sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
}

/// Remove cached renditions older than `days` from `cache_root`.
///
/// With `days == 0` the entire cache root is wiped. Entries that cannot be
/// inspected or deleted are skipped with a warning; the sweep keeps going so
/// one bad entry cannot wedge the whole cleanup.
pub async fn sweep_cache(
    storage: &dyn Storage,
    cache_root: &Path,
    days: u32,
) -> io::Result<SweepReport> {
    let files = match storage.list_files(cache_root).await {
        Ok(files) => files,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SweepReport::default()),
        Err(e) => return Err(e),
    };

    if days == 0 {
        storage.delete_dir(cache_root).await?;
        return Ok(SweepReport {
            scanned: files.len(),
            deleted: files.len(),
        });
    }

    let max_age = time::Duration::days(i64::from(days));
    let now = OffsetDateTime::now_utc();
    let mut deleted = 0;

    for file in &files {
        let modified = match storage.last_modified(file).await {
            Ok(modified) => OffsetDateTime::from(modified),
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "skipping unreadable cache entry");
                continue;
            }
        };
        if now - modified >= max_age {
            match storage.delete(file).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "failed to delete cache entry");
                }
            }
        }
    }

    Ok(SweepReport {
        scanned: files.len(),
        deleted,
    })
}
