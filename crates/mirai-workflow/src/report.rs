//! 报告合成
//!
//! 最近一次上传的文档对 + 摘要页 → 单个PDF报告。任何一步失败都不会留下报告文件。

use chrono::{DateTime, Local};
use mirai_core::utils::generate_report_id;
use mirai_core::{MiraiError, ReportArtifact, Result, RiskAssessment};
use mirai_database::StudyRepository;
use mirai_document::{page_count, DocumentMerger, SummaryPage};
use mirai_storage::{StorageArea, StorageManager};
use std::sync::Arc;
use tracing::{debug, info};

/// 报告访问路径前缀
pub const REPORT_URL_PREFIX: &str = "/static/reports";

/// 报告合成器
#[derive(Clone)]
pub struct ReportComposer {
    storage: StorageManager,
    repository: Arc<dyn StudyRepository>,
    merger: DocumentMerger,
}

impl ReportComposer {
    pub fn new(storage: StorageManager, repository: Arc<dyn StudyRepository>) -> Self {
        Self {
            storage,
            repository,
            merger: DocumentMerger::new(),
        }
    }

    /// 以当前本地时间生成报告
    pub async fn compose(&self, assessment: RiskAssessment) -> Result<ReportArtifact> {
        self.compose_at(assessment, Local::now()).await
    }

    /// 以指定的生成时间生成报告
    pub async fn compose_at(
        &self,
        assessment: RiskAssessment,
        generated_at: DateTime<Local>,
    ) -> Result<ReportArtifact> {
        let pair = self.repository.latest_pair().await?.ok_or_else(|| {
            MiraiError::NotFound("No PDF studies found to merge. Please upload PDFs first.".to_string())
        })?;
        debug!("使用文档对 {} ({})", pair.id, pair.study_name);

        if !self.storage.exists(StorageArea::Archives, &pair.filename_a).await {
            return Err(MiraiError::NotFound(format!(
                "Source PDF 1 not found: {}",
                pair.filename_a
            )));
        }
        if !self.storage.exists(StorageArea::Archives, &pair.filename_b).await {
            return Err(MiraiError::NotFound(format!(
                "Source PDF 2 not found: {}",
                pair.filename_b
            )));
        }

        let first = self.storage.read(StorageArea::Archives, &pair.filename_a).await?;
        let second = self.storage.read(StorageArea::Archives, &pair.filename_b).await?;

        let merger = self.merger.clone();
        let summary = SummaryPage::new(&assessment, &pair.study_name, generated_at);
        let (merged, pages) = tokio::task::spawn_blocking(move || -> Result<(Vec<u8>, usize)> {
            let summary_pdf = summary.render()?;
            let merged = merger.merge(&[first.as_slice(), second.as_slice(), summary_pdf.as_slice()])?;
            let pages = page_count(&merged)?;
            Ok((merged, pages))
        })
        .await
        .map_err(|e| MiraiError::Internal(format!("Report task failed: {}", e)))??;

        let report_id = generate_report_id();
        let filename = format!("Reporte_{}.pdf", report_id);
        self.storage.store(StorageArea::Reports, &filename, &merged).await?;

        info!(
            "报告已生成: {} ({} 页, {} {})",
            filename,
            pages,
            assessment.percentage_text(),
            assessment.label
        );

        Ok(ReportArtifact {
            url: format!("{}/{}", REPORT_URL_PREFIX, filename),
            report_id,
            filename,
            study_name: pair.study_name,
            page_count: pages,
            percentage: assessment.percentage,
            label: assessment.label,
        })
    }
}

impl std::fmt::Debug for ReportComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportComposer")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}
