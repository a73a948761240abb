use axum::body::Bytes;
use futures_util::stream::{Stream, StreamExt};
use mime_guess::Mime;
use serde::Serialize;
use std::fmt;
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::pin::pin;
use std::time::{Duration, SystemTime};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::atomic::{AtomicFile, is_temp_name, remove_stale_temp_files};
use crate::config::FILES_URL_PREFIX;

const MAX_EXTENSION_LEN: usize = 16;

/// Flat upload directory. The directory listing is the only index.
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Starts a request-scoped batch of uploads.
    pub fn begin_batch(&self) -> UploadBatch<'_> {
        UploadBatch {
            storage: self,
            stored: Vec::new(),
        }
    }

    /// Maps a stored name onto a path directly inside the root.
    fn resolve(&self, stored_name: &str) -> Result<PathBuf, StorageError> {
        if stored_name.contains(['/', '\\', '\0']) {
            return Err(StorageError::InvalidName);
        }
        let mut components = Path::new(stored_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(segment)), None) => Ok(self.root.join(segment)),
            _ => Err(StorageError::InvalidName),
        }
    }

    pub async fn list(&self) -> Result<Vec<FileEntry>, StorageError> {
        let mut dir = fs::read_dir(&self.root).await.map_err(StorageError::Io)?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if is_temp_name(&name) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            entries.push(FileEntry::new(name, metadata.len()));
        }

        entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(entries)
    }

    pub async fn open(&self, stored_name: &str) -> Result<StoredObject, StorageError> {
        let target = self.resolve(stored_name)?;
        if is_temp_name(stored_name) {
            return Err(StorageError::NotFound);
        }
        let metadata = fs::symlink_metadata(&target).await?;
        if metadata.file_type().is_symlink() {
            return Err(StorageError::InvalidName);
        }
        if !metadata.is_file() {
            return Err(StorageError::NotFound);
        }
        let file = File::open(&target).await?;

        Ok(StoredObject {
            file,
            size: metadata.len(),
            modified: metadata.modified().ok(),
            content_type: mime_guess::from_path(&target).first_or_octet_stream(),
        })
    }

    pub async fn remove_stale_temp_files(&self, ttl: Duration) -> io::Result<usize> {
        remove_stale_temp_files(&self.root, ttl).await
    }
}

/// Files written by one upload request.
///
/// Nothing is committed until [`UploadBatch::commit`]; a failed batch is
/// expected to call [`UploadBatch::rollback`] so no partial batch stays on disk.
pub struct UploadBatch<'a> {
    storage: &'a Storage,
    stored: Vec<StoredFile>,
}

impl UploadBatch<'_> {
    /// Streams one client file into a freshly named stored file.
    ///
    /// The client name only contributes its extension; the stored name is
    /// always generated.
    pub async fn store<S, E>(
        &mut self,
        original_name: &str,
        stream: S,
    ) -> Result<&StoredFile, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: fmt::Display,
    {
        let write_failure = |source: io::Error| StorageError::Write {
            original_name: original_name.to_string(),
            source,
        };
        let name = generate_stored_name(original_name);
        let target = self.storage.resolve(&name)?;

        let mut atomic = AtomicFile::new(&target).await.map_err(write_failure)?;
        let write_result: io::Result<u64> = async {
            let mut stream = pin!(stream);
            let mut total_written: u64 = 0;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|err| io::Error::other(err.to_string()))?;
                if chunk.is_empty() {
                    continue;
                }
                atomic.file_mut().write_all(&chunk).await?;
                total_written += chunk.len() as u64;
            }
            Ok(total_written)
        }
        .await;
        let size = match write_result {
            Ok(size) => size,
            Err(err) => {
                atomic.cleanup().await;
                return Err(write_failure(err));
            }
        };
        atomic.finalize().await.map_err(write_failure)?;

        debug!(original_name, stored_name = name, size, "stored upload");
        self.stored.push(StoredFile { name, size });
        Ok(&self.stored[self.stored.len() - 1])
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }

    pub fn commit(self) -> Vec<StoredFile> {
        self.stored
    }

    /// Removes every file this batch already stored.
    pub async fn rollback(self) {
        for file in self.stored {
            let path = self.storage.root.join(&file.name);
            if let Err(err) = fs::remove_file(&path).await {
                warn!(stored_name = file.name, error = %err, "failed to roll back stored file");
            }
        }
    }
}

/// Extension of the client-supplied name, including the leading dot.
///
/// Only the last path component counts and the dot must be neither its
/// first nor last character. Extensions with anything but ASCII
/// alphanumerics, `-` or `_` are dropped.
pub fn derive_extension(original_name: &str) -> String {
    let base = original_name.rsplit(['/', '\\']).next().unwrap_or_default();
    let Some(dot) = base.rfind('.') else {
        return String::new();
    };
    if dot == 0 || dot + 1 == base.len() {
        return String::new();
    }
    let extension = &base[dot + 1..];
    let allowed = extension.len() <= MAX_EXTENSION_LEN
        && extension
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !allowed {
        return String::new();
    }
    format!(".{extension}")
}

pub fn generate_stored_name(original_name: &str) -> String {
    format!("{}{}", Uuid::new_v4(), derive_extension(original_name))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub size: u64,
}

impl StoredFile {
    pub fn url(&self) -> String {
        file_url(&self.name)
    }
}

fn file_url(name: &str) -> String {
    format!("{FILES_URL_PREFIX}{name}")
}

/// An opened stored file ready to be streamed back.
pub struct StoredObject {
    pub file: File,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub content_type: Mime,
}

#[derive(Serialize, Debug)]
pub struct FileEntry {
    pub name: String,
    pub url: String,
    pub size: u64,
}

impl FileEntry {
    fn new(name: String, size: u64) -> Self {
        let url = file_url(&name);
        Self { name, url, size }
    }
}

#[derive(Debug)]
pub enum StorageError {
    InvalidName,
    NotFound,
    Write {
        original_name: String,
        source: io::Error,
    },
    Io(io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InvalidName => f.write_str("invalid file name"),
            StorageError::NotFound => f.write_str("file not found"),
            StorageError::Write {
                original_name,
                source,
            } => write!(f, "Error uploading {original_name}: {source}"),
            StorageError::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Write { source, .. } => Some(source),
            StorageError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound => StorageError::NotFound,
            _ => StorageError::Io(err),
        }
    }
}
