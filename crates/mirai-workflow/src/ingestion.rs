//! 影像批量接收
//!
//! 逐个文件处理：校验 → 按内容寻址落盘 → 提取元数据 → 生成预览。
//! 单个文件失败只记入 `errors`，预览失败记入 `warnings`，批次本身不会因此中止。

use mirai_core::utils::{content_key, generate_preview_id};
use mirai_core::{ImageMetadata, ImageRecord, UploadedFile};
use mirai_dicom::{ImageNormalizer, MetadataExtractor, UploadPolicy};
use mirai_storage::{StorageArea, StorageManager};
use serde::Serialize;
use tracing::{debug, info, warn};

/// 一个批次的处理结果，`uploaded_files` / `previews` / `metadata` 按输入顺序逐项对齐
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub success: bool,
    pub uploaded_files: Vec<String>,
    pub previews: Vec<Option<String>>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metadata: Vec<ImageMetadata>,
}

impl BatchOutcome {
    fn push(&mut self, record: ImageRecord) {
        self.uploaded_files.push(record.stored_filename);
        self.previews.push(record.preview_id);
        self.metadata.push(record.metadata);
    }

    /// 全部失败时的汇总错误信息
    pub fn error_summary(&self) -> Option<String> {
        if self.success {
            None
        } else {
            Some(self.errors.join(", "))
        }
    }
}

/// 影像接收网关
#[derive(Debug, Clone)]
pub struct IngestionGateway {
    storage: StorageManager,
    policy: UploadPolicy,
    extractor: MetadataExtractor,
    normalizer: ImageNormalizer,
}

impl IngestionGateway {
    pub fn new(storage: StorageManager) -> Self {
        Self {
            storage,
            policy: UploadPolicy::dicom(),
            extractor: MetadataExtractor::new(),
            normalizer: ImageNormalizer::default(),
        }
    }

    /// 处理一个批次，按输入顺序逐个完成
    pub async fn ingest(&self, files: Vec<UploadedFile>) -> BatchOutcome {
        let total = files.len();
        let mut outcome = BatchOutcome::default();

        for file in files {
            let sanitized = match self.policy.validate(&file.filename) {
                Ok(name) => name,
                Err(e) => {
                    debug!("拒绝文件 {:?}: {}", file.filename, e);
                    outcome.errors.push(e.message());
                    continue;
                }
            };

            match self.ingest_one(&sanitized, &file.data, &mut outcome.warnings).await {
                Ok(record) => outcome.push(record),
                Err(reason) => {
                    warn!("文件 {} 处理失败: {}", sanitized, reason);
                    outcome
                        .errors
                        .push(format!("Failed to save or process {}: {}", sanitized, reason));
                }
            }
        }

        outcome.success = !outcome.uploaded_files.is_empty();
        info!(
            "批次处理完成: {}/{} 个文件成功, {} 个错误, {} 个警告",
            outcome.uploaded_files.len(),
            total,
            outcome.errors.len(),
            outcome.warnings.len()
        );
        outcome
    }

    async fn ingest_one(
        &self,
        sanitized: &str,
        data: &[u8],
        warnings: &mut Vec<String>,
    ) -> Result<ImageRecord, String> {
        let stored_filename = content_key(data, sanitized);
        let path = self
            .storage
            .store(StorageArea::Uploads, &stored_filename, data)
            .await
            .map_err(|e| e.message())?;

        // 解码和渲染是CPU密集操作，放到阻塞线程池，但仍逐个等待以保持顺序
        let extractor = self.extractor.clone();
        let normalizer = self.normalizer.clone();
        let decode_path = path.clone();
        let decoded = tokio::task::spawn_blocking(move || {
            let metadata = extractor.extract(&decode_path);
            let preview = normalizer.render_preview(&decode_path);
            (metadata, preview)
        })
        .await;

        let (metadata, preview) = match decoded {
            Ok(result) => result,
            Err(e) => {
                warnings.push(format!("Preview failed for {}: {}", sanitized, e));
                let metadata = self.extractor.extract(&path);
                return Ok(ImageRecord {
                    stored_filename,
                    preview_id: None,
                    metadata,
                });
            }
        };

        let preview_id = match preview {
            Ok(png) => {
                let preview_id = generate_preview_id();
                match self.storage.store(StorageArea::Previews, &preview_id, &png).await {
                    Ok(_) => Some(preview_id),
                    Err(e) => {
                        warnings.push(format!("Preview failed for {}: {}", sanitized, e.message()));
                        None
                    }
                }
            }
            Err(e) => {
                debug!("预览生成失败 {}: {}", sanitized, e);
                warnings.push(format!("Preview failed for {}: {}", sanitized, e.message()));
                None
            }
        };

        Ok(ImageRecord {
            stored_filename,
            preview_id,
            metadata,
        })
    }
}
