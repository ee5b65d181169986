//! HistoryLog — per-check append-only log files and their archives.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::codec;
use crate::error::{LogError, LogResult};

/// Extension of live, appendable log files.
pub const LOG_EXT: &str = ".log";

/// Extension of compressed archives.
pub const ARCHIVE_EXT: &str = ".gz.b64";

/// Result of rotating one log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rotation {
    /// Contents were archived under `archive` and the live file emptied.
    Rotated { archive: String, bytes: usize },
    /// The live file was empty; nothing was archived.
    Skipped,
}

/// Append-only history log rooted at a directory.
///
/// Cheap to clone; clones share the same per-name locks.
#[derive(Clone)]
pub struct HistoryLog {
    inner: Arc<Inner>,
}

struct Inner {
    root: PathBuf,
    /// Per-name exclusion: name → lock.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl HistoryLog {
    /// Open the log root, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> LogResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| LogError::io(&root.display().to_string(), e))?;
        debug!(?root, "history log opened");
        Ok(Self {
            inner: Arc::new(Inner {
                root,
                locks: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Append `line` plus a newline to `{name}.log`, creating it if absent.
    ///
    /// The line is written with a single write while holding the name's
    /// lock, so readers never observe a partial record from another writer.
    pub async fn append(&self, name: &str, line: &str) -> LogResult<()> {
        validate_name(name)?;
        if line.contains('\n') {
            return Err(LogError::MultiLine(name.to_string()));
        }

        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(name))
            .await
            .map_err(|e| LogError::io(name, e))?;
        file.write_all(buf.as_bytes())
            .await
            .map_err(|e| LogError::io(name, e))?;
        file.flush().await.map_err(|e| LogError::io(name, e))?;
        Ok(())
    }

    /// Current contents of `{name}.log`.
    pub async fn read(&self, name: &str) -> LogResult<String> {
        validate_name(name)?;
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        tokio::fs::read_to_string(self.log_path(name))
            .await
            .map_err(|e| LogError::io(name, e))
    }

    /// Identifiers of all live logs, plus archives when `include_compressed`.
    ///
    /// Extensions are stripped; the result is sorted.
    pub async fn list(&self, include_compressed: bool) -> LogResult<Vec<String>> {
        self.prune_locks();
        let root_name = self.inner.root.display().to_string();
        let mut dir = tokio::fs::read_dir(&self.inner.root)
            .await
            .map_err(|e| LogError::io(&root_name, e))?;

        let mut ids = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| LogError::io(&root_name, e))?
        {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(id) = file_name.strip_suffix(ARCHIVE_EXT) {
                if include_compressed && !id.is_empty() {
                    ids.push(id.to_string());
                }
            } else if let Some(id) = file_name.strip_suffix(LOG_EXT) {
                if !id.is_empty() {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Compress the contents of `{source_id}.log` into a new archive
    /// `{dest_id}.gz.b64`. Fails with `ArchiveExists` rather than overwrite.
    pub async fn compress(&self, source_id: &str, dest_id: &str) -> LogResult<()> {
        validate_name(source_id)?;
        validate_name(dest_id)?;
        let lock = self.lock_for(source_id);
        let _guard = lock.lock().await;

        let contents = tokio::fs::read_to_string(self.log_path(source_id))
            .await
            .map_err(|e| LogError::io(source_id, e))?;
        self.write_archive(dest_id, &contents).await
    }

    /// Original text of archive `{id}.gz.b64`.
    pub async fn decompress(&self, id: &str) -> LogResult<String> {
        validate_name(id)?;
        let encoded = tokio::fs::read_to_string(self.archive_path(id))
            .await
            .map_err(|e| LogError::io(id, e))?;
        codec::decode(&encoded).map_err(|e| LogError::Corrupt {
            name: id.to_string(),
            reason: e.to_string(),
        })
    }

    /// Empty `{id}.log` in place. The file is kept so appends continue.
    pub async fn truncate(&self, id: &str) -> LogResult<()> {
        validate_name(id)?;
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        self.truncate_locked(id).await
    }

    /// Compress `{id}.log` into `{dest_id}.gz.b64`, then truncate it, as one
    /// step under the name's lock. Empty logs are skipped.
    pub async fn rotate(&self, id: &str, dest_id: &str) -> LogResult<Rotation> {
        validate_name(id)?;
        validate_name(dest_id)?;
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let contents = tokio::fs::read_to_string(self.log_path(id))
            .await
            .map_err(|e| LogError::io(id, e))?;
        if contents.is_empty() {
            return Ok(Rotation::Skipped);
        }

        self.write_archive(dest_id, &contents).await?;
        self.truncate_locked(id).await?;
        debug!(%id, archive = %dest_id, bytes = contents.len(), "log rotated");
        Ok(Rotation::Rotated {
            archive: dest_id.to_string(),
            bytes: contents.len(),
        })
    }

    /// Publish `contents` as `{dest_id}.gz.b64`. The archive is written to a
    /// hidden temp file and linked into place once synced, so readers never
    /// see a partial archive and an existing one is never replaced.
    async fn write_archive(&self, dest_id: &str, contents: &str) -> LogResult<()> {
        let encoded = codec::encode(contents).map_err(|e| LogError::Io {
            name: dest_id.to_string(),
            source: std::io::Error::other(e),
        })?;

        let path = self.archive_path(dest_id);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(LogError::ArchiveExists(dest_id.to_string()));
        }

        let tmp = self.inner.root.join(format!(".{dest_id}{ARCHIVE_EXT}.tmp"));
        let written = async {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)
                .await?;
            file.write_all(encoded.as_bytes()).await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(LogError::io(dest_id, e));
        }

        // hard_link fails with AlreadyExists instead of overwriting.
        let linked = tokio::fs::hard_link(&tmp, &path).await;
        let _ = tokio::fs::remove_file(&tmp).await;
        linked.map_err(|e| LogError::io(dest_id, e))
    }

    async fn truncate_locked(&self, id: &str) -> LogResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(self.log_path(id))
            .await
            .map_err(|e| LogError::io(id, e))?;
        file.set_len(0).await.map_err(|e| LogError::io(id, e))?;
        file.sync_all().await.map_err(|e| LogError::io(id, e))?;
        Ok(())
    }

    /// Forget locks nobody holds, so names of deleted checks do not pile up.
    fn prune_locks(&self) {
        self.inner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.inner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn lock_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .inner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    fn log_path(&self, name: &str) -> PathBuf {
        self.inner.root.join(format!("{name}{LOG_EXT}"))
    }

    fn archive_path(&self, name: &str) -> PathBuf {
        self.inner.root.join(format!("{name}{ARCHIVE_EXT}"))
    }
}

/// Names map straight to file names under the root; keep them flat.
fn validate_name(name: &str) -> LogResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(LogError::InvalidName(name.to_string()))
    }
}
