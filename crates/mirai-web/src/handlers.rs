//! HTTP处理器

use axum::{
    extract::{rejection::JsonRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use mirai_core::{MiraiError, RiskAssessment, UploadedFile};
use mirai_workflow::BatchOutcome;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::server::SharedState;

const MISSING_PDFS: &str = "Se requieren dos archivos PDF";
const MISSING_REPORT_FIELDS: &str = "Missing percentage or riskMessage in request.";
const NO_DETAILS: &str = "No detailed response";

/// 错误响应 `{success: false, error}`，状态码由错误类型决定
#[derive(Debug)]
pub struct ApiError(pub MiraiError);

impl From<MiraiError> for ApiError {
    fn from(err: MiraiError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            MiraiError::NotFound(_) => StatusCode::NOT_FOUND,
            MiraiError::Validation(_) => StatusCode::BAD_REQUEST,
            MiraiError::Transport { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("请求处理失败: {}", self.0);
        }
        (status, Json(json!({ "success": false, "error": self.0.message() }))).into_response()
    }
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 读取multipart中指定名称的文件字段
async fn collect_files(multipart: &mut Multipart, names: &[&str]) -> Result<Vec<(String, UploadedFile)>, String> {
    let mut files = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(format!("Invalid multipart request: {}", e)),
        };

        let name = field.name().unwrap_or_default().to_string();
        if !names.contains(&name.as_str()) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| format!("Invalid multipart request: {}", e))?;
        files.push((name, UploadedFile::new(filename, data.to_vec())));
    }
    Ok(files)
}

/// DICOM批量上传
pub async fn upload_dicoms(State(state): State<SharedState>, mut multipart: Multipart) -> Json<Value> {
    let files = match collect_files(&mut multipart, &["file"]).await {
        Ok(files) => files,
        Err(e) => {
            warn!("{}", e);
            return Json(json!({ "success": false, "error": e }));
        }
    };

    if files.is_empty() {
        return Json(json!({ "success": false, "error": "No file part" }));
    }

    let files = files.into_iter().map(|(_, file)| file).collect();
    let outcome = state.ingestion.ingest(files).await;

    match batch_response(&outcome) {
        Ok(body) => Json(body),
        Err(e) => {
            error!("上传结果序列化失败: {}", e);
            Json(json!({ "success": false, "error": e.message() }))
        }
    }
}

/// 批次结果始终带全部字段，全部失败时另加汇总的 `error`
fn batch_response(outcome: &BatchOutcome) -> Result<Value, MiraiError> {
    let mut body = serde_json::to_value(outcome)?;
    if let (Some(summary), Some(map)) = (outcome.error_summary(), body.as_object_mut()) {
        map.insert("error".to_string(), Value::String(summary));
    }
    Ok(body)
}

/// 上传一对PDF
pub async fn upload_pdfs(State(state): State<SharedState>, mut multipart: Multipart) -> Json<Value> {
    let files = match collect_files(&mut multipart, &["pdf1", "pdf2"]).await {
        Ok(files) => files,
        Err(e) => return Json(json!({ "success": false, "error": e })),
    };

    let pick = |wanted: &str| {
        files
            .iter()
            .find(|(name, file)| name == wanted && !file.filename.is_empty())
            .map(|(_, file)| file.clone())
    };
    let (first, second) = match (pick("pdf1"), pick("pdf2")) {
        (Some(first), Some(second)) => (first, second),
        _ => return Json(json!({ "success": false, "error": MISSING_PDFS })),
    };

    match state.archive.archive_pair(first, second).await {
        Ok(record) => {
            info!("PDF文档对已上传: {}", record.study_name);
            Json(json!({
                "success": true,
                "message": "Archivos subidos correctamente",
                "study_id": record.id,
                "study_name": record.study_name,
            }))
        }
        Err(e) => Json(json!({ "success": false, "error": e.message() })),
    }
}

/// 百分比可以是数字或数字字符串
fn parse_percentage(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// 生成报告
pub async fn generate_report_pdf(
    State(state): State<SharedState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(|e| {
        warn!("报告请求格式错误: {}", e);
        MiraiError::Validation(MISSING_REPORT_FIELDS.to_string())
    })?;

    let percentage = body.get("percentage").and_then(parse_percentage);
    let label = body.get("riskMessage").and_then(Value::as_str);
    let assessment = match (percentage, label) {
        (Some(percentage), Some(label)) => RiskAssessment::new(percentage, label),
        _ => return Err(MiraiError::Validation(MISSING_REPORT_FIELDS.to_string()).into()),
    };

    match state.composer.compose(assessment).await {
        Ok(artifact) => Ok(Json(json!({
            "success": true,
            "report_url": artifact.url,
        }))),
        Err(e) if e.is_not_found() => Err(e.into()),
        Err(e) => Err(MiraiError::Internal(format!("Error generating report PDF: {}", e.message())).into()),
    }
}

/// 把最近上传的DICOM发送到分析服务
pub async fn process_recent_dicoms(State(state): State<SharedState>) -> Json<Value> {
    match state.dispatcher.dispatch_recent().await {
        Ok(outcome) => Json(json!({
            "success": true,
            "message": outcome.message,
            "target_response": outcome.target_response,
        })),
        Err(MiraiError::Transport { message, details }) => Json(json!({
            "success": false,
            "error": message,
            "details": details.unwrap_or_else(|| NO_DETAILS.to_string()),
        })),
        Err(e) => Json(json!({ "success": false, "error": e.message() })),
    }
}

/// 列出所有PDF文档对
pub async fn list_studies(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let records = state.archive.list().await?;
    let studies: Vec<Value> = records
        .into_iter()
        .map(|r| {
            json!({
                "id": r.id,
                "study_name": r.study_name,
                "filename_a": r.filename_a,
                "filename_b": r.filename_b,
                "uploaded_at": r.uploaded_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string(),
            })
        })
        .collect();
    Ok(Json(Value::Array(studies)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ApiError(MiraiError::NotFound("x".into())).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError(MiraiError::Validation("x".into())).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError(MiraiError::Decode("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_failed_batch_keeps_all_keys() {
        let outcome = BatchOutcome {
            errors: vec!["Invalid file type: a.png".to_string()],
            ..Default::default()
        };
        let body = batch_response(&outcome).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid file type: a.png");
        assert_eq!(body["uploaded_files"], json!([]));
        assert_eq!(body["previews"], json!([]));
        assert_eq!(body["metadata"], json!([]));
        assert_eq!(body["warnings"], json!([]));
    }

    #[test]
    fn test_parse_percentage() {
        assert_eq!(parse_percentage(&json!(82)), Some(82.0));
        assert_eq!(parse_percentage(&json!(82.5)), Some(82.5));
        assert_eq!(parse_percentage(&json!("82.5")), Some(82.5));
        assert_eq!(parse_percentage(&json!("82%")), Some(82.0));
        assert_eq!(parse_percentage(&json!("high")), None);
        assert_eq!(parse_percentage(&json!(null)), None);
    }
}
