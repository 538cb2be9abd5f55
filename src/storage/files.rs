use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

const STAGING_DIR: &str = ".tmp";
const CURRENT_FILE: &str = "current";
const VERSIONS_DIR: &str = "versions";

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("file not found")]
    NotFound,
    #[error("file exceeds the limit of {limit} bytes")]
    TooLarge { limit: i64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FileStoreError {
    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

/// Blob store for document content.
///
/// ```text
/// <root>/<document_id>/current
/// <root>/<document_id>/versions/<version_id>
/// <root>/.tmp/<uuid>
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_dir(&self, document_id: &str) -> PathBuf {
        self.root.join(document_id)
    }

    #[must_use]
    pub fn current_path(&self, document_id: &str) -> PathBuf {
        self.document_dir(document_id).join(CURRENT_FILE)
    }

    #[must_use]
    pub fn version_path(&self, document_id: &str, version_id: &str) -> PathBuf {
        self.document_dir(document_id)
            .join(VERSIONS_DIR)
            .join(version_id)
    }

    fn temp_path(&self) -> PathBuf {
        self.root
            .join(STAGING_DIR)
            .join(Uuid::new_v4().to_string())
    }

    /// Opens a staging file that accepts at most `max_bytes`.
    pub async fn stage(&self, max_bytes: i64) -> Result<StagingFile, FileStoreError> {
        let path = self.temp_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = File::create(&path).await?;

        Ok(StagingFile {
            guard: TempGuard::new(path),
            file,
            hasher: Sha256::new(),
            size: 0,
            max_bytes,
        })
    }

    /// Moves a staged upload into place as the document's current content.
    pub async fn commit_current(
        &self,
        staged: StagedUpload,
        document_id: &str,
    ) -> Result<(), FileStoreError> {
        let final_path = self.current_path(document_id);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::rename(staged.path(), &final_path).await?;
        staged.guard.disarm();
        Ok(())
    }

    /// Copies a staged upload to a version slot, leaving the staged file intact.
    pub async fn save_version(
        &self,
        staged: &StagedUpload,
        document_id: &str,
        version_id: &str,
    ) -> Result<(), FileStoreError> {
        let target = self.version_path(document_id, version_id);
        copy_file(staged.path(), &target).await
    }

    /// Snapshots the current content into a version slot.
    pub async fn copy_current_to_version(
        &self,
        document_id: &str,
        version_id: &str,
    ) -> Result<(), FileStoreError> {
        let source = self.current_path(document_id);
        let target = self.version_path(document_id, version_id);
        copy_file(&source, &target).await
    }

    /// Stages a copy of a stored version so it can be committed as current.
    pub async fn stage_version(
        &self,
        document_id: &str,
        version_id: &str,
    ) -> Result<StagedUpload, FileStoreError> {
        let source = self.version_path(document_id, version_id);
        let target = self.temp_path();
        let guard = TempGuard::new(target.clone());
        copy_file(&source, &target).await?;

        let size = fs::metadata(&target).await?.len() as i64;
        let sha256 = hash_file(&target).await?;

        Ok(StagedUpload {
            guard,
            size,
            sha256,
        })
    }

    pub async fn open_current(
        &self,
        document_id: &str,
    ) -> Result<(BufReader<File>, i64), FileStoreError> {
        open_file(&self.current_path(document_id)).await
    }

    pub async fn open_version(
        &self,
        document_id: &str,
        version_id: &str,
    ) -> Result<(BufReader<File>, i64), FileStoreError> {
        open_file(&self.version_path(document_id, version_id)).await
    }

    /// Reads at most `limit` bytes of the current content.
    pub async fn read_current_prefix(
        &self,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<u8>, FileStoreError> {
        let (reader, _) = self.open_current(document_id).await?;
        let mut buf = Vec::new();
        reader.take(limit as u64).read_to_end(&mut buf).await?;
        Ok(buf)
    }

    pub async fn delete_version(
        &self,
        document_id: &str,
        version_id: &str,
    ) -> Result<bool, FileStoreError> {
        match fs::remove_file(self.version_path(document_id, version_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FileStoreError::Io(e)),
        }
    }

    /// Removes every blob belonging to a document.
    pub async fn delete_document(&self, document_id: &str) -> Result<bool, FileStoreError> {
        match fs::remove_dir_all(self.document_dir(document_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FileStoreError::Io(e)),
        }
    }
}

/// An upload in progress. Dropping it removes the partial file.
pub struct StagingFile {
    guard: TempGuard,
    file: File,
    hasher: Sha256,
    size: i64,
    max_bytes: i64,
}

impl StagingFile {
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), FileStoreError> {
        self.size += chunk.len() as i64;
        if self.size > self.max_bytes {
            return Err(FileStoreError::TooLarge {
                limit: self.max_bytes,
            });
        }

        self.hasher.update(chunk);
        self.file.write_all(chunk).await?;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<StagedUpload, FileStoreError> {
        self.file.flush().await?;
        self.file.sync_all().await?;

        Ok(StagedUpload {
            guard: self.guard,
            size: self.size,
            sha256: hex::encode(self.hasher.finalize()),
        })
    }
}

/// A complete staged file with its size and SHA-256. Dropping it without
/// committing removes the file.
pub struct StagedUpload {
    guard: TempGuard,
    pub size: i64,
    pub sha256: String,
}

impl StagedUpload {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.guard.path
    }
}

struct TempGuard {
    path: PathBuf,
    armed: bool,
}

impl TempGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!("Failed to remove staging file {}: {e}", self.path.display());
                }
            }
        }
    }
}

async fn copy_file(source: &Path, target: &Path) -> Result<(), FileStoreError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::copy(source, target)
        .await
        .map_err(FileStoreError::from_io)?;
    Ok(())
}

/// Opens a file for streaming along with its size.
pub async fn open_file(path: &Path) -> Result<(BufReader<File>, i64), FileStoreError> {
    let file = File::open(path).await.map_err(FileStoreError::from_io)?;
    let size = file.metadata().await?.len() as i64;
    Ok((BufReader::new(file), size))
}

async fn hash_file(path: &Path) -> Result<String, FileStoreError> {
    let mut file = File::open(path).await.map_err(FileStoreError::from_io)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
