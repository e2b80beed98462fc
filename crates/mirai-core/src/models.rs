//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 元数据缺失时的占位值
pub const NOT_AVAILABLE: &str = "N/A";

/// 影像元数据（固定八个字段，缺失时为 `N/A`）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    #[serde(rename = "PatientName")]
    pub patient_name: String,
    #[serde(rename = "PatientID")]
    pub patient_id: String,
    #[serde(rename = "StudyDate")]
    pub study_date: String,
    #[serde(rename = "PatientAge")]
    pub patient_age: String,
    #[serde(rename = "PatientSex")]
    pub patient_sex: String,
    #[serde(rename = "Modality")]
    pub modality: String,
    #[serde(rename = "BodyPartExamined")]
    pub body_part_examined: String,
    #[serde(rename = "FileSize")]
    pub file_size: String,
}

impl Default for ImageMetadata {
    fn default() -> Self {
        Self::unavailable()
    }
}

impl ImageMetadata {
    /// 所有字段均为占位值
    pub fn unavailable() -> Self {
        Self {
            patient_name: NOT_AVAILABLE.to_string(),
            patient_id: NOT_AVAILABLE.to_string(),
            study_date: NOT_AVAILABLE.to_string(),
            patient_age: NOT_AVAILABLE.to_string(),
            patient_sex: NOT_AVAILABLE.to_string(),
            modality: NOT_AVAILABLE.to_string(),
            body_part_examined: NOT_AVAILABLE.to_string(),
            file_size: NOT_AVAILABLE.to_string(),
        }
    }

    /// 以 (键, 值) 形式遍历八个字段，顺序固定
    pub fn entries(&self) -> [(&'static str, &str); 8] {
        [
            ("PatientName", &self.patient_name),
            ("PatientID", &self.patient_id),
            ("StudyDate", &self.study_date),
            ("PatientAge", &self.patient_age),
            ("PatientSex", &self.patient_sex),
            ("Modality", &self.modality),
            ("BodyPartExamined", &self.body_part_examined),
            ("FileSize", &self.file_size),
        ]
    }
}

/// 单个已入库影像的记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub stored_filename: String,
    pub preview_id: Option<String>,
    pub metadata: ImageMetadata,
}

/// 客户端上传的原始文件
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

/// 成对归档的PDF文档记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPairRecord {
    pub id: i64,
    pub study_name: String,
    pub filename_a: String,
    pub filename_b: String,
    pub uploaded_at: DateTime<Utc>,
}

/// 文档对插入模型
#[derive(Debug, Clone)]
pub struct NewDocumentPair {
    pub study_name: String,
    pub filename_a: String,
    pub filename_b: String,
    pub uploaded_at: DateTime<Utc>,
}

/// 远程风险评估结果（报告输入）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub percentage: f64,
    pub label: String,
}

impl RiskAssessment {
    /// 高风险标签，须完全相等
    pub const HIGH_RISK_LABEL: &'static str = "ALTO RIESGO";

    pub fn new(percentage: f64, label: impl Into<String>) -> Self {
        Self {
            percentage,
            label: label.into(),
        }
    }

    pub fn is_high_risk(&self) -> bool {
        self.label == Self::HIGH_RISK_LABEL
    }

    /// 百分比文本：整数不带小数位
    pub fn percentage_text(&self) -> String {
        if self.percentage.fract() == 0.0 {
            format!("{:.0}%", self.percentage)
        } else {
            format!("{}%", self.percentage)
        }
    }
}

/// 生成的报告文件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub report_id: String,
    pub filename: String,
    pub url: String,
    pub study_name: String,
    pub page_count: usize,
    pub percentage: f64,
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_serializes_eight_keys() {
        let value = serde_json::to_value(ImageMetadata::unavailable()).unwrap();
        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 8);
        for (key, _) in ImageMetadata::unavailable().entries() {
            assert_eq!(map[key], NOT_AVAILABLE);
        }
    }

    #[test]
    fn test_percentage_text() {
        assert_eq!(RiskAssessment::new(82.0, "x").percentage_text(), "82%");
        assert_eq!(RiskAssessment::new(82.5, "x").percentage_text(), "82.5%");
        assert_eq!(RiskAssessment::new(0.0, "x").percentage_text(), "0%");
    }

    #[test]
    fn test_high_risk_is_exact_match() {
        assert!(RiskAssessment::new(1.0, "ALTO RIESGO").is_high_risk());
        assert!(!RiskAssessment::new(1.0, "alto riesgo").is_high_risk());
        assert!(!RiskAssessment::new(1.0, "ALTO RIESGO ").is_high_risk());
        assert!(!RiskAssessment::new(1.0, "BAJO RIESGO").is_high_risk());
    }
}
