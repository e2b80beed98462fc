//! 上传文件校验
//!
//! 扩展名白名单 + 文件名净化。净化规则：NFKD分解后只保留ASCII，路径分隔符视为空白，
//! 空白串以 `_` 连接，丢弃 `[A-Za-z0-9_.-]` 以外的字符，去掉首尾的 `.` 和 `_`，
//! Windows设备名前加 `_`。净化后的名称必须仍然通过白名单。

use mirai_core::{MiraiError, Result};
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

/// DICOM上传允许的扩展名
pub const DICOM_EXTENSIONS: &[&str] = &["dcm", "dicom"];

const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "LPT1", "LPT2", "LPT3",
];

/// 上传策略
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    extensions: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::dicom()
    }
}

impl UploadPolicy {
    /// DICOM文件策略（`.dcm` / `.dicom`）
    pub fn dicom() -> Self {
        Self::with_extensions(DICOM_EXTENSIONS)
    }

    pub fn with_extensions(extensions: &[&str]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
        }
    }

    /// 扩展名是否在白名单内（大小写不敏感）
    pub fn is_allowed(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            }
            None => false,
        }
    }

    /// 校验并返回净化后的文件名
    pub fn validate(&self, filename: &str) -> Result<String> {
        if filename.is_empty() {
            return Err(MiraiError::Validation("Empty file name".to_string()));
        }
        if !self.is_allowed(filename) {
            return Err(MiraiError::Validation(format!("Invalid file type: {}", filename)));
        }

        let sanitized = secure_filename(filename);
        if sanitized.is_empty() {
            return Err(MiraiError::Validation(format!(
                "Invalid file name: {}",
                filename
            )));
        }
        // 净化可能吃掉扩展名前的整个主干，例如 `中文.dcm` -> `dcm`
        if !self.is_allowed(&sanitized) {
            return Err(MiraiError::Validation(format!("Invalid file type: {}", filename)));
        }
        if sanitized != filename {
            debug!("文件名已净化: {} -> {}", filename, sanitized);
        }
        Ok(sanitized)
    }
}

/// 把任意客户端文件名转换为安全的单段文件名，可能返回空串
pub fn secure_filename(filename: &str) -> String {
    let spaced: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');

    let stem = trimmed.split('.').next().unwrap_or_default().to_ascii_uppercase();
    if !trimmed.is_empty() && WINDOWS_DEVICE_NAMES.contains(&stem.as_str()) {
        format!("_{}", trimmed)
    } else {
        trimmed.to_string()
    }
}
