//! 远程分析服务调用
//!
//! 取上传区最近的若干个DICOM文件，以multipart流式发送到分析服务，原样转发对方的JSON结果。

use mirai_core::{MiraiError, Result};
use mirai_dicom::UploadPolicy;
use mirai_storage::{StorageArea, StorageManager, StoredFile};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

const DICOM_MIME: &str = "application/dicom";
const FAILURE_PREFIX: &str = "Failed to send files to the analysis service or receive valid response";

/// 调用参数
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub endpoint: String,
    pub batch_size: usize,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000/dicom/files".to_string(),
            batch_size: 4,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// 调用结果
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub files: Vec<String>,
    pub message: String,
    pub target_response: serde_json::Value,
}

/// 单次尝试的失败，`retryable` 表示可以重试
struct AttemptError {
    error: MiraiError,
    retryable: bool,
}

/// 远程分析服务调用器
#[derive(Debug, Clone)]
pub struct RemoteDispatcher {
    client: reqwest::Client,
    settings: DispatchSettings,
    storage: StorageManager,
    policy: UploadPolicy,
}

impl RemoteDispatcher {
    pub fn new(storage: StorageManager, settings: DispatchSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| MiraiError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            settings,
            storage,
            policy: UploadPolicy::dicom(),
        })
    }

    /// 发送最近上传的文件
    pub async fn dispatch_recent(&self) -> Result<DispatchOutcome> {
        let files = self
            .storage
            .list_recent(
                StorageArea::Uploads,
                |name| self.policy.is_allowed(name),
                self.settings.batch_size,
            )
            .await?;

        if files.is_empty() {
            return Err(MiraiError::NotFound(
                "No DICOM files found in the upload folder to process.".to_string(),
            ));
        }

        let names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();
        info!("发送 {} 个DICOM文件到 {}", files.len(), self.settings.endpoint);

        let mut attempt = 0;
        loop {
            match self.send_once(&files).await {
                Ok(target_response) => {
                    return Ok(DispatchOutcome {
                        message: format!(
                            "Successfully sent {} DICOM files to the analysis service.",
                            names.len()
                        ),
                        files: names,
                        target_response,
                    });
                }
                Err(failure) if failure.retryable && attempt < self.settings.max_retries => {
                    attempt += 1;
                    let delay = self.settings.retry_backoff * attempt;
                    warn!(
                        "第 {} 次发送失败，{:?} 后重试: {}",
                        attempt, delay, failure.error
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(failure) => {
                    error!("发送到分析服务失败: {}", failure.error);
                    return Err(failure.error);
                }
            }
        }
    }

    /// 一次完整的请求；文件句柄归请求体所有，请求结束即释放
    async fn send_once(&self, files: &[StoredFile]) -> std::result::Result<serde_json::Value, AttemptError> {
        let mut form = Form::new();
        for stored in files {
            let file = tokio::fs::File::open(&stored.path).await.map_err(|e| AttemptError {
                error: MiraiError::Storage(format!(
                    "Failed to open file {} for processing: {}",
                    stored.name, e
                )),
                retryable: false,
            })?;

            let body = Body::wrap_stream(ReaderStream::new(file));
            let part = Part::stream_with_length(body, stored.size)
                .file_name(stored.name.clone())
                .mime_str(DICOM_MIME)
                .map_err(|e| AttemptError {
                    error: MiraiError::Internal(format!("Invalid MIME type: {}", e)),
                    retryable: false,
                })?;
            form = form.part("dicom", part);
        }
        form = form.text("data", "{}");

        let response = self
            .client
            .post(&self.settings.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AttemptError {
                retryable: e.is_connect() || e.is_timeout(),
                error: transport(format!("{}: {}", FAILURE_PREFIX, e), None),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AttemptError {
            retryable: e.is_timeout(),
            error: transport(format!("{}: {}", FAILURE_PREFIX, e), None),
        })?;
        debug!("分析服务响应 {}: {} bytes", status, body.len());

        if !status.is_success() {
            return Err(AttemptError {
                retryable: status.is_server_error(),
                error: transport(status_message(status), Some(body)),
            });
        }

        serde_json::from_str(&body).map_err(|e| AttemptError {
            retryable: false,
            error: transport(format!("{}: invalid JSON ({})", FAILURE_PREFIX, e), Some(body)),
        })
    }
}

fn status_message(status: StatusCode) -> String {
    format!("{}: HTTP {}", FAILURE_PREFIX, status)
}

fn transport(message: String, details: Option<String>) -> MiraiError {
    MiraiError::Transport { message, details }
}
