//! 通用工具函数

use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// 生成预览图标识（`<uuid>.png`）
pub fn generate_preview_id() -> String {
    format!("{}.png", Uuid::new_v4())
}

/// 生成报告标识（32位十六进制）
pub fn generate_report_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 生成检查名称：`Estudio_<时间戳>_<8位随机十六进制>`
pub fn generate_study_name(now: DateTime<Local>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("Estudio_{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// 基于内容哈希的存储键，同名不同内容的文件互不覆盖
pub fn content_key(data: &[u8], sanitized_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let hex = format!("{:x}", hasher.finalize());
    format!("{}_{}", &hex[..16], sanitized_name)
}

/// 文件大小（MB，保留两位小数）
pub fn format_file_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}
