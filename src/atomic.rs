//! 存储目录内的临时写入、原子改名与残留临时文件清理。

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs::{self, File};
use tracing::{info, warn};
use uuid::Uuid;

const TEMP_MARKER: &str = ".tmp.";

/// 判断文件名是否为写入中的临时文件（`.{name}.tmp.{uuid}`）。
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(TEMP_MARKER)
}

/// 写入完成前对外不可见的临时文件。
pub struct AtomicFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: File,
}

impl AtomicFile {
    /// 在目标文件同目录下创建临时文件。
    pub async fn new(target: &Path) -> io::Result<Self> {
        let parent = target
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no parent"))?;
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "file".into());
        let temp_path = parent.join(format!(".{base}{TEMP_MARKER}{}", Uuid::new_v4()));
        let file = File::options()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file,
        })
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// 放弃写入并删除临时文件。
    pub async fn cleanup(self) {
        drop(self.file);
        if let Err(err) = fs::remove_file(&self.temp_path).await {
            warn!(path = ?self.temp_path, error = %err, "failed to remove temp file");
        }
    }

    /// 落盘后以硬链接发布为目标文件，目标已存在时返回 `AlreadyExists`。
    pub async fn finalize(self) -> io::Result<()> {
        if let Err(err) = self.file.sync_all().await {
            drop(self.file);
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }
        drop(self.file);

        // 目标已存在时 link 原子失败。
        let linked = fs::hard_link(&self.temp_path, &self.target).await;
        if let Err(err) = fs::remove_file(&self.temp_path).await {
            warn!(path = ?self.temp_path, error = %err, "failed to remove temp file");
        }
        linked?;

        if let Some(parent) = self.target.parent() {
            let _ = sync_dir(parent).await;
        }
        Ok(())
    }
}

async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}

/// 删除目录下超过 `ttl` 的残留临时文件，返回删除数量。
pub async fn remove_stale_temp_files(dir: &Path, ttl: Duration) -> io::Result<usize> {
    if ttl.is_zero() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut removed = 0;
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !is_temp_name(&name.to_string_lossy()) {
            continue;
        }
        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => continue,
        };
        let Some(age) = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
        else {
            continue;
        };
        if age < ttl {
            continue;
        }
        let path = entry.path();
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = ?path, "removed stale temp file");
                removed += 1;
            }
            Err(err) => warn!(path = ?path, error = %err, "failed to remove stale temp file"),
        }
    }

    Ok(removed)
}
