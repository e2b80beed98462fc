//! 文件存储管理
//!
//! 四个存储区：上传的DICOM、PNG预览、PDF归档、生成的报告。
//! 所有写入先落到同目录的临时文件再重命名，读者不会看到写了一半的文件。

use chrono::{DateTime, Utc};
use mirai_core::{MiraiError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// 存储区
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageArea {
    Uploads,
    Previews,
    Archives,
    Reports,
}

impl StorageArea {
    pub const ALL: [StorageArea; 4] = [
        StorageArea::Uploads,
        StorageArea::Previews,
        StorageArea::Archives,
        StorageArea::Reports,
    ];
}

impl fmt::Display for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageArea::Uploads => "uploads",
            StorageArea::Previews => "previews",
            StorageArea::Archives => "archives",
            StorageArea::Reports => "reports",
        };
        f.write_str(name)
    }
}

/// 各存储区的根目录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageLayout {
    pub uploads: PathBuf,
    pub previews: PathBuf,
    pub archives: PathBuf,
    pub reports: PathBuf,
}

impl StorageLayout {
    /// 在同一个根目录下按默认子目录名布局
    pub fn under<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            uploads: root.join("dicom_uploads"),
            previews: root.join("previews"),
            archives: root.join("archives"),
            reports: root.join("reports"),
        }
    }

    pub fn dir(&self, area: StorageArea) -> &Path {
        match area {
            StorageArea::Uploads => &self.uploads,
            StorageArea::Previews => &self.previews,
            StorageArea::Archives => &self.archives,
            StorageArea::Reports => &self.reports,
        }
    }
}

/// 存储区中的文件条目
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// 存储管理器
#[derive(Debug, Clone)]
pub struct StorageManager {
    layout: StorageLayout,
}

impl StorageManager {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// 创建全部存储区目录（已存在时不报错）
    pub async fn ensure_layout(&self) -> Result<()> {
        for area in StorageArea::ALL {
            let dir = self.layout.dir(area);
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                MiraiError::Storage(format!("Failed to create storage directory {}: {}", dir.display(), e))
            })?;
            debug!("存储区 {} 就绪: {}", area, dir.display());
        }
        info!("存储布局初始化完成");
        Ok(())
    }

    /// 解析存储区内文件的完整路径，名称必须是单段文件名
    pub fn path(&self, area: StorageArea, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.layout.dir(area).join(name))
    }

    /// 原子写入：临时文件 + 重命名
    pub async fn store(&self, area: StorageArea, name: &str, data: &[u8]) -> Result<PathBuf> {
        let target = self.path(area, name)?;
        let temp = self
            .layout
            .dir(area)
            .join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()));

        if let Err(e) = tokio::fs::write(&temp, data).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(MiraiError::Storage(format!("Failed to write {}: {}", name, e)));
        }

        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(MiraiError::Storage(format!("Failed to commit {}: {}", name, e)));
        }

        debug!("已写入 {}/{} ({} bytes)", area, name, data.len());
        Ok(target)
    }

    /// 读取文件内容
    pub async fn read(&self, area: StorageArea, name: &str) -> Result<Vec<u8>> {
        let path = self.path(area, name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(MiraiError::NotFound(format!("{}/{}", area, name)))
            }
            Err(e) => Err(MiraiError::Storage(format!("Failed to read {}: {}", name, e))),
        }
    }

    pub async fn exists(&self, area: StorageArea, name: &str) -> bool {
        match self.path(area, name) {
            Ok(path) => tokio::fs::metadata(&path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// 删除文件，文件不存在视为成功
    pub async fn remove(&self, area: StorageArea, name: &str) -> Result<()> {
        let path = self.path(area, name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("无法删除 {}/{}: {}", area, name, e);
                Err(MiraiError::Storage(format!("Failed to remove {}: {}", name, e)))
            }
        }
    }

    /// 列出最近修改的普通文件：按修改时间降序，相同时按名称排序，最多 `limit` 个
    pub async fn list_recent<F>(&self, area: StorageArea, filter: F, limit: usize) -> Result<Vec<StoredFile>>
    where
        F: Fn(&str) -> bool,
    {
        let dir = self.layout.dir(area);
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(MiraiError::Storage(format!(
                    "Failed to read directory {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if name.starts_with('.') || !filter(&name) {
                continue;
            }

            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

            files.push(StoredFile {
                name,
                path: entry.path(),
                size: meta.len(),
                modified: DateTime::<Utc>::from(modified),
            });
        }

        files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        files.truncate(limit);
        Ok(files)
    }
}

/// 单段文件名即可，名称内部的 `..` 不构成路径穿越
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(MiraiError::Validation(format!("Invalid file name: {}", name)));
    }
    Ok(())
}
