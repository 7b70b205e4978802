//! Flat-directory blob store.
//!
//! Blobs are stored as `<id><extension>` in one directory. Uploads stream
//! into a hidden staging file (`.<id>.partial`) and are linked into place on
//! commit, so readers never observe a half-written blob under its final name.
//! Identifier resolution scans the directory for a name owned by the id; the
//! population is bounded by the retention window, so the scan stays cheap.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs::{self, File, OpenOptions, ReadDir};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::id::BlobId;

/// Longest extension (without the dot) kept from an original filename.
pub const MAX_EXTENSION_LEN: usize = 16;

const STAGING_SUFFIX: &str = ".partial";
const COPY_BUF_SIZE: usize = 64 * 1024;

/// Metadata of one stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRecord {
    /// Identifier assigned at store time.
    pub id: BlobId,
    /// Extension of the original filename, without the leading dot.
    pub extension: Option<String>,
    /// Absolute path of the stored file.
    pub stored_path: PathBuf,
    /// Stored filename, `<id>` or `<id>.<extension>`.
    pub file_name: String,
    /// Size in bytes.
    pub size: u64,
    /// Creation time, falling back to the modification time on filesystems
    /// without birth time.
    pub created_at: SystemTime,
    /// Last modification time; drives retention.
    pub modified_at: SystemTime,
}

/// One entry produced by [`BlobStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Filename within the store directory.
    pub file_name: String,
    /// Last modification time.
    pub modified: SystemTime,
}

/// Lazy, single-pass enumeration of stored files.
///
/// Entries that disappear between the directory read and the stat are
/// skipped. Other per-entry failures are yielded as `Err` so the caller can
/// count them and move on.
pub struct BlobEntries {
    dir: ReadDir,
    done: bool,
}

impl BlobEntries {
    /// Returns the next stored entry, or `None` once the directory is exhausted.
    pub async fn next_entry(&mut self) -> Option<StoreResult<BlobEntry>> {
        while !self.done {
            let entry = match self.dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(StoreError::Io(e)));
                }
            };

            let path = entry.path();
            let file_name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => {
                    debug!(path = %path.display(), "skipping non-UTF-8 filename");
                    continue;
                }
            };

            let metadata = match fs::symlink_metadata(&path).await {
                Ok(m) => m,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(file = %file_name, "entry vanished before stat");
                    continue;
                }
                Err(e) => return Some(Err(StoreError::Io(e))),
            };
            if !metadata.is_file() {
                continue;
            }

            return Some(metadata.modified().map_err(StoreError::Io).map(|modified| BlobEntry {
                path,
                file_name,
                modified,
            }));
        }
        None
    }
}

/// An upload in progress. Dropping it without [`PendingBlob::commit`]
/// removes the staging file.
pub struct PendingBlob {
    id: BlobId,
    extension: Option<String>,
    staging_path: PathBuf,
    final_path: PathBuf,
    file: Option<File>,
    written: u64,
    finished: bool,
}

impl PendingBlob {
    /// Identifier the blob will be stored under.
    pub fn id(&self) -> BlobId {
        self.id
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Appends a chunk of the uploaded stream.
    pub async fn write(&mut self, chunk: &[u8]) -> StoreResult<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            StoreError::write_failure(
                &self.staging_path,
                std::io::Error::new(ErrorKind::BrokenPipe, "staging file already closed"),
            )
        })?;
        file.write_all(chunk)
            .await
            .map_err(|e| StoreError::write_failure(&self.staging_path, e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flushes the staging file and moves it to its final name.
    ///
    /// The final name is never overwritten: if it already exists the commit
    /// fails with `WriteFailure` and the staging file is discarded.
    pub async fn commit(mut self) -> StoreResult<BlobRecord> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| StoreError::write_failure(&self.staging_path, e))?;
            file.sync_all()
                .await
                .map_err(|e| StoreError::write_failure(&self.staging_path, e))?;
        }

        publish(&self.staging_path, &self.final_path).await?;
        self.finished = true;

        let record = record_for(self.id, self.extension.clone(), &self.final_path).await?;
        info!(id = %record.id, file = %record.file_name, bytes = record.size, "blob stored");
        Ok(record)
    }

    /// Discards the upload.
    pub async fn abort(mut self) {
        self.file.take();
        if let Err(e) = fs::remove_file(&self.staging_path).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.staging_path.display(), error = %e, "failed to remove staging file");
            }
        }
        self.finished = true;
    }
}

impl Drop for PendingBlob {
    fn drop(&mut self) {
        if !self.finished {
            self.file.take();
            let _ = std::fs::remove_file(&self.staging_path);
        }
    }
}

/// Links `staging` to `target` without replacing an existing file, then
/// drops the staging name. Falls back to an existence check plus rename on
/// filesystems without hard links.
async fn publish(staging: &Path, target: &Path) -> StoreResult<()> {
    match fs::hard_link(staging, target).await {
        Ok(()) => {
            if let Err(e) = fs::remove_file(staging).await {
                warn!(path = %staging.display(), error = %e, "failed to drop staging link");
            }
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StoreError::write_failure(target, e)),
        Err(link_err) => {
            debug!(error = %link_err, "hard link unavailable, renaming staging file");
            match fs::try_exists(target).await {
                Ok(false) => fs::rename(staging, target)
                    .await
                    .map_err(|e| StoreError::write_failure(target, e)),
                Ok(true) => Err(StoreError::write_failure(
                    target,
                    std::io::Error::new(ErrorKind::AlreadyExists, "blob already exists"),
                )),
                Err(e) => Err(StoreError::write_failure(target, e)),
            }
        }
    }
}

async fn record_for(id: BlobId, extension: Option<String>, path: &Path) -> StoreResult<BlobRecord> {
    let metadata = fs::metadata(path).await?;
    let modified_at = metadata.modified()?;
    let created_at = metadata.created().unwrap_or(modified_at);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| id.to_string());
    Ok(BlobRecord {
        id,
        extension,
        stored_path: path.to_path_buf(),
        file_name,
        size: metadata.len(),
        created_at,
        modified_at,
    })
}

/// Extracts the extension of a client-supplied filename.
///
/// Only the last path component is considered. Extensions that are empty,
/// longer than [`MAX_EXTENSION_LEN`] or not ASCII alphanumeric are dropped.
pub fn extension_of(original_name: &str) -> Option<String> {
    let base = original_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(original_name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    if !ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_string())
}

/// Stored filename for an identifier and optional extension.
pub fn stored_name(id: &BlobId, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{}.{}", id, ext),
        None => id.to_string(),
    }
}

/// Extracts the identifier from a stored filename.
pub fn id_of(file_name: &str) -> Option<BlobId> {
    let stem = file_name.split_once('.').map_or(file_name, |(stem, _)| stem);
    stem.parse().ok()
}

/// Temporary file store rooted at one directory.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Opens the store, creating its directory if needed.
    pub async fn open(config: &StoreConfig) -> StoreResult<Self> {
        fs::create_dir_all(&config.upload_dir).await?;
        let root = fs::canonicalize(&config.upload_dir).await?;
        info!(dir = %root.display(), "blob store opened");
        Ok(Self { root })
    }

    /// Directory holding the blobs.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Starts a streamed upload under a freshly generated identifier.
    pub async fn begin(&self, original_name: &str) -> StoreResult<PendingBlob> {
        let id = BlobId::generate();
        let extension = extension_of(original_name);
        let final_path = self.root.join(stored_name(&id, extension.as_deref()));
        let staging_path = self.root.join(format!(".{}{}", id, STAGING_SUFFIX));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging_path)
            .await
            .map_err(|e| StoreError::write_failure(&staging_path, e))?;

        debug!(%id, original = original_name, "upload started");
        Ok(PendingBlob {
            id,
            extension,
            staging_path,
            final_path,
            file: Some(file),
            written: 0,
            finished: false,
        })
    }

    /// Stores everything `reader` yields.
    pub async fn store<R>(&self, reader: &mut R, original_name: &str) -> StoreResult<BlobRecord>
    where
        R: AsyncRead + Unpin,
    {
        let mut pending = self.begin(original_name).await?;
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| StoreError::write_failure(&pending.staging_path, e))?;
            if n == 0 {
                break;
            }
            pending.write(&buf[..n]).await?;
        }
        pending.commit().await
    }

    /// Stores an in-memory buffer.
    pub async fn store_bytes(&self, data: &[u8], original_name: &str) -> StoreResult<BlobRecord> {
        let mut pending = self.begin(original_name).await?;
        pending.write(data).await?;
        pending.commit().await
    }

    /// Finds the stored file owned by `id`.
    pub async fn resolve(&self, id: &BlobId) -> StoreResult<PathBuf> {
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !id.names(name) {
                continue;
            }
            match entry.file_type().await {
                Ok(ft) if ft.is_file() => return Ok(entry.path()),
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::Io(e)),
            }
        }
        Err(StoreError::NotFound { id: *id })
    }

    /// Builds the full record for a stored blob.
    pub async fn record(&self, id: &BlobId) -> StoreResult<BlobRecord> {
        let path = self.resolve(id).await?;
        let extension = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split_once('.'))
            .map(|(_, ext)| ext.to_string());
        match record_for(*id, extension, &path).await {
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound { id: *id })
            }
            other => other,
        }
    }

    /// Enumerates every stored file with its modification time.
    pub async fn list(&self) -> StoreResult<BlobEntries> {
        let dir = fs::read_dir(&self.root).await?;
        Ok(BlobEntries { dir, done: false })
    }

    /// Deletes one stored file. Best-effort: failures are logged and
    /// reported as `false`, never propagated.
    pub async fn delete(&self, path: &Path) -> bool {
        if path.parent() != Some(self.root.as_path()) {
            warn!(path = %path.display(), "refusing to delete path outside store");
            return false;
        }
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "blob deleted");
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "blob delete failed");
                false
            }
        }
    }

    /// Explicitly removes the blob owned by `id`.
    pub async fn remove(&self, id: &BlobId) -> StoreResult<PathBuf> {
        let path = self.resolve(id).await?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(%id, "blob removed");
                Ok(path)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound { id: *id }),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
