use async_trait::async_trait;
use chrono::{Local, TimeZone};
use lopdf::content::Content;
use lopdf::Document;
use mirai_core::{
    DocumentPairRecord, MiraiError, NewDocumentPair, Result, RiskAssessment, UploadedFile,
};
use mirai_database::{DatabasePool, SqliteStudyRepository, StudyRepository};
use mirai_document::test_support::{make_pdf, page_texts};
use mirai_storage::{StorageArea, StorageLayout, StorageManager};
use mirai_workflow::{DocumentArchive, ReportComposer};
use std::sync::Arc;

struct Harness {
    _dir: tempfile::TempDir,
    storage: StorageManager,
    archive: DocumentArchive,
    composer: ReportComposer,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let storage = StorageManager::new(StorageLayout::under(dir.path()));
    storage.ensure_layout().await.unwrap();

    let repo = SqliteStudyRepository::new(DatabasePool::in_memory().await.unwrap());
    repo.create_tables().await.unwrap();
    let repo: Arc<dyn StudyRepository> = Arc::new(repo);

    Harness {
        archive: DocumentArchive::new(storage.clone(), repo.clone()),
        composer: ReportComposer::new(storage.clone(), repo),
        storage,
        _dir: dir,
    }
}

fn pdf(name: &str, labels: &[&str]) -> UploadedFile {
    UploadedFile::new(name, make_pdf(labels))
}

/// 最后一页中 `label` 之前最近一次设置的填充色
fn fill_color_before(data: &[u8], label: &str) -> Vec<f32> {
    let doc = Document::load_mem(data).unwrap();
    let last = *doc.get_pages().values().last().unwrap();
    let content = Content::decode(&doc.get_page_content(last).unwrap()).unwrap();

    let mut color = Vec::new();
    for op in &content.operations {
        match op.operator.as_str() {
            "rg" => color = op.operands.iter().map(|o| o.as_float().unwrap()).collect(),
            "Tj" if op.operands[0].as_str().unwrap() == label.as_bytes() => return color,
            _ => {}
        }
    }
    panic!("label {:?} not drawn", label);
}

#[tokio::test]
async fn test_report_without_pairs_is_not_found() {
    let h = harness().await;
    let err = h
        .composer
        .compose(RiskAssessment::new(50.0, "BAJO RIESGO"))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(
        err.message(),
        "No PDF studies found to merge. Please upload PDFs first."
    );
}

#[tokio::test]
async fn test_report_uses_latest_pair() {
    let h = harness().await;

    h.archive
        .archive_pair(pdf("a.pdf", &["A1", "A2", "A3"]), pdf("b.pdf", &["B1", "B2"]))
        .await
        .unwrap();
    let latest = h
        .archive
        .archive_pair(pdf("c.PDF", &["C1"]), pdf("d.pdf", &["D1"]))
        .await
        .unwrap();

    let generated_at = Local.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
    let artifact = h
        .composer
        .compose_at(RiskAssessment::new(82.0, "ALTO RIESGO"), generated_at)
        .await
        .unwrap();

    assert_eq!(artifact.page_count, 3);
    assert_eq!(artifact.study_name, latest.study_name);
    assert!(artifact.filename.starts_with("Reporte_"));
    assert_eq!(artifact.url, format!("/static/reports/{}", artifact.filename));

    let report = h
        .storage
        .read(StorageArea::Reports, &artifact.filename)
        .await
        .unwrap();
    let texts = page_texts(&report);
    assert_eq!(texts.len(), 3);
    assert_eq!(texts[0], "C1");
    assert_eq!(texts[1], "D1");

    let summary = &texts[2];
    assert!(summary.starts_with("Reporte de An"));
    assert!(summary.contains("82%"));
    assert!(summary.contains("ALTO RIESGO"));
    assert!(summary.contains(&latest.study_name));
    assert!(summary.contains("2024-02-03 04:05:06"));

    assert_eq!(fill_color_before(&report, "ALTO RIESGO"), vec![1.0, 0.0, 0.0]);
}

#[tokio::test]
async fn test_low_risk_label_is_green() {
    let h = harness().await;
    h.archive
        .archive_pair(pdf("a.pdf", &["A1"]), pdf("b.pdf", &["B1", "B2"]))
        .await
        .unwrap();

    let artifact = h
        .composer
        .compose(RiskAssessment::new(12.5, "BAJO RIESGO"))
        .await
        .unwrap();
    assert_eq!(artifact.page_count, 4);

    let report = h
        .storage
        .read(StorageArea::Reports, &artifact.filename)
        .await
        .unwrap();
    assert!(page_texts(&report)[3].contains("12.5%"));
    assert_eq!(fill_color_before(&report, "BAJO RIESGO"), vec![0.0, 0.5, 0.0]);
}

#[tokio::test]
async fn test_missing_archive_file_is_not_found() {
    let h = harness().await;
    let record = h
        .archive
        .archive_pair(pdf("a.pdf", &["A1"]), pdf("b.pdf", &["B1"]))
        .await
        .unwrap();
    h.storage
        .remove(StorageArea::Archives, &record.filename_b)
        .await
        .unwrap();

    let err = h
        .composer
        .compose(RiskAssessment::new(82.0, "ALTO RIESGO"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(
        err.message(),
        format!("Source PDF 2 not found: {}", record.filename_b)
    );

    // 失败时不留下报告文件
    let reports = h
        .storage
        .list_recent(StorageArea::Reports, |_| true, 10)
        .await
        .unwrap();
    assert!(reports.is_empty());
}

#[tokio::test]
async fn test_corrupt_archive_aborts_report() {
    let h = harness().await;
    h.archive
        .archive_pair(
            UploadedFile::new("a.pdf", b"%PDF-1.4 truncated".to_vec()),
            pdf("b.pdf", &["B1"]),
        )
        .await
        .unwrap();

    let err = h
        .composer
        .compose(RiskAssessment::new(82.0, "ALTO RIESGO"))
        .await
        .unwrap_err();
    assert!(matches!(err, MiraiError::Decode(_)));

    let reports = h
        .storage
        .list_recent(StorageArea::Reports, |_| true, 10)
        .await
        .unwrap();
    assert!(reports.is_empty());
}

#[tokio::test]
async fn test_archive_rejects_non_pdf() {
    let h = harness().await;
    let err = h
        .archive
        .archive_pair(pdf("a.pdf", &["A1"]), UploadedFile::new("b.docx", b"x".to_vec()))
        .await
        .unwrap_err();
    assert_eq!(err.message(), "Ambos archivos deben ser PDF");
    assert!(h.archive.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_archive_names_follow_study_name() {
    let h = harness().await;
    let record = h
        .archive
        .archive_pair(pdf("x.pdf", &["X1"]), pdf("y.pdf", &["Y1"]))
        .await
        .unwrap();

    assert!(record.study_name.starts_with("Estudio_"));
    assert_eq!(record.filename_a, format!("{}_1.pdf", record.study_name));
    assert_eq!(record.filename_b, format!("{}_2.pdf", record.study_name));
    assert!(h.storage.exists(StorageArea::Archives, &record.filename_a).await);
    assert!(h.storage.exists(StorageArea::Archives, &record.filename_b).await);
}

struct FailingRepository;

#[async_trait]
impl StudyRepository for FailingRepository {
    async fn insert_pair(&self, _pair: NewDocumentPair) -> Result<DocumentPairRecord> {
        Err(MiraiError::Persistence("disk I/O error".to_string()))
    }

    async fn latest_pair(&self) -> Result<Option<DocumentPairRecord>> {
        Ok(None)
    }

    async fn list_pairs(&self) -> Result<Vec<DocumentPairRecord>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_failed_record_write_removes_archived_files() {
    let dir = tempfile::tempdir().unwrap();
    let storage = StorageManager::new(StorageLayout::under(dir.path()));
    storage.ensure_layout().await.unwrap();
    let archive = DocumentArchive::new(storage.clone(), Arc::new(FailingRepository));

    let err = archive
        .archive_pair(pdf("a.pdf", &["A1"]), pdf("b.pdf", &["B1"]))
        .await
        .unwrap_err();
    assert!(matches!(err, MiraiError::Persistence(_)));

    let leftovers = storage
        .list_recent(StorageArea::Archives, |_| true, 10)
        .await
        .unwrap();
    assert!(leftovers.is_empty());
}
