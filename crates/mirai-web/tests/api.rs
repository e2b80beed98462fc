use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use mirai_database::{DatabasePool, SqliteStudyRepository, StudyRepository};
use mirai_dicom::test_support::{sample_dicom_bytes, SampleDicom};
use mirai_document::test_support::make_pdf;
use mirai_integration::{DispatchSettings, RemoteDispatcher};
use mirai_storage::{StorageLayout, StorageManager};
use mirai_web::{create_app, AppState, DEFAULT_MAX_BODY_BYTES};
use mirai_workflow::{DocumentArchive, IngestionGateway, ReportComposer};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BOUNDARY: &str = "mirai-test-boundary";

async fn app() -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let storage = StorageManager::new(StorageLayout::under(dir.path()));
    storage.ensure_layout().await.unwrap();

    let repo = SqliteStudyRepository::new(DatabasePool::in_memory().await.unwrap());
    repo.create_tables().await.unwrap();
    let repo: Arc<dyn StudyRepository> = Arc::new(repo);

    let settings = DispatchSettings {
        endpoint: "http://127.0.0.1:9/dicom/files".to_string(),
        connect_timeout: Duration::from_millis(200),
        request_timeout: Duration::from_secs(1),
        max_retries: 0,
        ..DispatchSettings::default()
    };

    let state = AppState {
        ingestion: IngestionGateway::new(storage.clone()),
        archive: DocumentArchive::new(storage.clone(), repo.clone()),
        composer: ReportComposer::new(storage.clone(), repo),
        dispatcher: RemoteDispatcher::new(storage.clone(), settings).unwrap(),
        storage,
    };
    (dir, create_app(Arc::new(state), DEFAULT_MAX_BODY_BYTES))
}

/// (字段名, 文件名, 内容)
fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, filename, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_request(uri: &str, parts: &[(&str, &str, &[u8])]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn json_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn upload_pair(app: &Router) -> Value {
    let first = make_pdf(&["A1", "A2"]);
    let second = make_pdf(&["B1"]);
    let (status, body) = send_json(
        app,
        multipart_request(
            "/upload_pdf",
            &[("pdf1", "first.pdf", &first), ("pdf2", "second.pdf", &second)],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn test_health() {
    let (_dir, app) = app().await;
    let (status, body) = send_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_upload_without_file_part() {
    let (_dir, app) = app().await;
    let (status, body) = send_json(
        &app,
        multipart_request("/upload", &[("other", "a.dcm", b"x")]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": false, "error": "No file part" }));
}

#[tokio::test]
async fn test_upload_dicom_serves_preview() {
    let (_dir, app) = app().await;
    let dicom = sample_dicom_bytes(&SampleDicom::gradient(8, 8)).unwrap();

    let (status, body) = send_json(
        &app,
        multipart_request(
            "/upload",
            &[("file", "head.dcm", &dicom), ("file", "notes.txt", b"text")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["uploaded_files"].as_array().unwrap().len(), 1);
    assert_eq!(body["errors"], json!(["Invalid file type: notes.txt"]));
    assert_eq!(body["metadata"][0]["PatientName"], "Doe^Jane");

    let preview = body["previews"][0].as_str().unwrap();
    let (status, png) = send(&app, get(&format!("/previews/{}", preview))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(png.starts_with(b"\x89PNG"));
}

#[tokio::test]
async fn test_upload_all_rejected() {
    let (_dir, app) = app().await;
    let (status, body) = send_json(
        &app,
        multipart_request("/upload", &[("file", "scan.png", b"x")]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid file type: scan.png");
    assert_eq!(body["errors"], json!(["Invalid file type: scan.png"]));
    assert_eq!(body["uploaded_files"], json!([]));
    assert_eq!(body["previews"], json!([]));
    assert_eq!(body["metadata"], json!([]));
}

#[tokio::test]
async fn test_report_failure_message_is_readable() {
    let (_dir, app) = app().await;
    let second = make_pdf(&["B1"]);
    send_json(
        &app,
        multipart_request(
            "/upload_pdf",
            &[("pdf1", "broken.pdf", b"%PDF-1.4 truncated"), ("pdf2", "b.pdf", &second)],
        ),
    )
    .await;

    let (status, body) = send_json(
        &app,
        json_request(
            "/generate_report_pdf",
            r#"{"percentage": 82, "riskMessage": "ALTO RIESGO"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Error generating report PDF: PDF 1 "));
    assert!(error.is_ascii());
}

#[tokio::test]
async fn test_upload_pdf_requires_both_files() {
    let (_dir, app) = app().await;
    let only = make_pdf(&["A1"]);
    let (_, body) = send_json(
        &app,
        multipart_request("/upload_pdf", &[("pdf1", "a.pdf", &only)]),
    )
    .await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Se requieren dos archivos PDF");
}

#[tokio::test]
async fn test_upload_pdf_rejects_other_types() {
    let (_dir, app) = app().await;
    let pdf = make_pdf(&["A1"]);
    let (_, body) = send_json(
        &app,
        multipart_request(
            "/upload_pdf",
            &[("pdf1", "a.pdf", &pdf), ("pdf2", "b.txt", b"plain")],
        ),
    )
    .await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Ambos archivos deben ser PDF");
}

#[tokio::test]
async fn test_report_request_validation() {
    let (_dir, app) = app().await;

    let (status, body) = send_json(&app, json_request("/generate_report_pdf", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing percentage or riskMessage in request.");

    let (status, _) = send_json(
        &app,
        json_request("/generate_report_pdf", r#"{"percentage": 40}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_report_without_studies_is_not_found() {
    let (_dir, app) = app().await;
    let (status, body) = send_json(
        &app,
        json_request(
            "/generate_report_pdf",
            r#"{"percentage": 82, "riskMessage": "ALTO RIESGO"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(
        body["error"],
        "No PDF studies found to merge. Please upload PDFs first."
    );
}

#[tokio::test]
async fn test_report_round_trip() {
    let (_dir, app) = app().await;
    let uploaded = upload_pair(&app).await;
    assert_eq!(uploaded["success"], true);
    assert_eq!(uploaded["message"], "Archivos subidos correctamente");

    let (status, body) = send_json(
        &app,
        json_request(
            "/generate_report_pdf",
            r#"{"percentage": "82.5", "riskMessage": "ALTO RIESGO"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let url = body["report_url"].as_str().unwrap();
    assert!(url.starts_with("/static/reports/Reporte_"));
    let (status, pdf) = send(&app, get(url)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(pdf.starts_with(b"%PDF"));
}

#[tokio::test]
async fn test_list_studies() {
    let (_dir, app) = app().await;
    let uploaded = upload_pair(&app).await;

    let (status, body) = send_json(&app, get("/studies")).await;
    assert_eq!(status, StatusCode::OK);
    let studies = body.as_array().unwrap();
    assert_eq!(studies.len(), 1);
    assert_eq!(studies[0]["id"], uploaded["study_id"]);
    assert_eq!(studies[0]["study_name"], uploaded["study_name"]);
    assert_eq!(studies[0]["uploaded_at"].as_str().unwrap().len(), 19);
}

#[tokio::test]
async fn test_process_without_uploads() {
    let (_dir, app) = app().await;
    let (status, body) = send_json(
        &app,
        Request::builder()
            .method("POST")
            .uri("/process_recent_dicoms")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(
        body["error"],
        "No DICOM files found in the upload folder to process."
    );
}

#[tokio::test]
async fn test_process_reports_unreachable_service() {
    let (_dir, app) = app().await;
    let dicom = sample_dicom_bytes(&SampleDicom::gradient(4, 4)).unwrap();
    send_json(&app, multipart_request("/upload", &[("file", "a.dcm", &dicom)])).await;

    let (status, body) = send_json(
        &app,
        Request::builder()
            .method("POST")
            .uri("/process_recent_dicoms")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["details"], "No detailed response");
}
