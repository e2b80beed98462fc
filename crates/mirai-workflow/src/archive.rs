//! PDF文档对归档

use chrono::{Local, Utc};
use mirai_core::utils::generate_study_name;
use mirai_core::{DocumentPairRecord, MiraiError, NewDocumentPair, Result, UploadedFile};
use mirai_dicom::{secure_filename, UploadPolicy};
use mirai_storage::{StorageArea, StorageManager};
use std::sync::Arc;
use tracing::{error, info};

use mirai_database::StudyRepository;

/// 文档对归档服务
#[derive(Clone)]
pub struct DocumentArchive {
    storage: StorageManager,
    repository: Arc<dyn StudyRepository>,
    policy: UploadPolicy,
}

impl DocumentArchive {
    pub fn new(storage: StorageManager, repository: Arc<dyn StudyRepository>) -> Self {
        Self {
            storage,
            repository,
            policy: UploadPolicy::with_extensions(&["pdf"]),
        }
    }

    /// 保存两个PDF并写入一条记录；记录写入失败时删除已保存的文件
    pub async fn archive_pair(&self, first: UploadedFile, second: UploadedFile) -> Result<DocumentPairRecord> {
        if !self.policy.is_allowed(&first.filename) || !self.policy.is_allowed(&second.filename) {
            return Err(MiraiError::Validation("Ambos archivos deben ser PDF".to_string()));
        }

        let study_name = generate_study_name(Local::now());
        let filename_a = secure_filename(&format!("{}_1.pdf", study_name));
        let filename_b = secure_filename(&format!("{}_2.pdf", study_name));

        self.storage
            .store(StorageArea::Archives, &filename_a, &first.data)
            .await
            .map_err(|e| MiraiError::Storage(format!("Failed to save PDF files: {}", e.message())))?;

        if let Err(e) = self
            .storage
            .store(StorageArea::Archives, &filename_b, &second.data)
            .await
        {
            self.discard(&[&filename_a]).await;
            return Err(MiraiError::Storage(format!("Failed to save PDF files: {}", e.message())));
        }

        let pair = NewDocumentPair {
            study_name,
            filename_a: filename_a.clone(),
            filename_b: filename_b.clone(),
            uploaded_at: Utc::now(),
        };

        match self.repository.insert_pair(pair).await {
            Ok(record) => {
                info!("文档对已归档: {} (id={})", record.study_name, record.id);
                Ok(record)
            }
            Err(e) => {
                error!("文档对记录写入失败: {}", e);
                self.discard(&[&filename_a, &filename_b]).await;
                Err(MiraiError::Persistence(format!("Failed to save PDF files: {}", e.message())))
            }
        }
    }

    /// 按id顺序列出全部记录
    pub async fn list(&self) -> Result<Vec<DocumentPairRecord>> {
        self.repository.list_pairs().await
    }

    async fn discard(&self, names: &[&str]) {
        for name in names {
            if let Err(e) = self.storage.remove(StorageArea::Archives, name).await {
                error!("清理归档文件 {} 失败: {}", name, e);
            }
        }
    }
}

impl std::fmt::Debug for DocumentArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentArchive")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}
