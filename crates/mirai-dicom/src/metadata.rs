//! DICOM元数据提取
//!
//! 读取固定的八个头字段。提取过程从不失败：整个文件无法解析时返回全部占位值
//! （文件大小仍根据存储上的文件计算），单个标签缺失或格式错误只影响该字段。

use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{open_file, InMemDicomObject};
use mirai_core::{utils::format_file_size, ImageMetadata, NOT_AVAILABLE};
use std::path::Path;
use tracing::{debug, warn};

/// DICOM元数据提取器
#[derive(Debug, Clone, Default)]
pub struct MetadataExtractor;

impl MetadataExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 从存储上的文件提取元数据
    pub fn extract<P: AsRef<Path>>(&self, path: P) -> ImageMetadata {
        let path = path.as_ref();
        let file_size = Self::file_size(path);

        let mut metadata = match open_file(path) {
            Ok(obj) => Self::from_object(&obj, None),
            Err(e) => {
                warn!("Error extracting metadata from {:?}: {}", path, e);
                ImageMetadata::unavailable()
            }
        };

        metadata.file_size = file_size
            .map(format_file_size)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let missing: Vec<&str> = metadata
            .entries()
            .iter()
            .filter(|(_, value)| *value == NOT_AVAILABLE)
            .map(|(key, _)| *key)
            .collect();
        if !missing.is_empty() {
            debug!("{:?} 缺少字段: {}", path, missing.join(", "));
        }
        metadata
    }

    /// 从已解析的数据集提取元数据，逐个标签独立读取
    pub fn from_object(obj: &InMemDicomObject, file_size: Option<u64>) -> ImageMetadata {
        ImageMetadata {
            patient_name: Self::read_tag(obj, tags::PATIENT_NAME, "PatientName"),
            patient_id: Self::read_tag(obj, tags::PATIENT_ID, "PatientID"),
            study_date: Self::read_tag(obj, tags::STUDY_DATE, "StudyDate"),
            patient_age: Self::read_tag(obj, tags::PATIENT_AGE, "PatientAge"),
            patient_sex: Self::read_tag(obj, tags::PATIENT_SEX, "PatientSex"),
            modality: Self::read_tag(obj, tags::MODALITY, "Modality"),
            body_part_examined: Self::read_tag(obj, tags::BODY_PART_EXAMINED, "BodyPartExamined"),
            file_size: file_size
                .map(format_file_size)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        }
    }

    /// 读取字符串标签，缺失、空值或无法转换时返回占位值
    fn read_tag(obj: &InMemDicomObject, tag: Tag, name: &str) -> String {
        let element = match obj.element(tag) {
            Ok(element) => element,
            Err(_) => {
                debug!("未找到标签: {}", name);
                return NOT_AVAILABLE.to_string();
            }
        };

        match element.to_str() {
            Ok(value) => {
                let value = value.trim_matches(|c: char| c.is_whitespace() || c == '\0');
                if value.is_empty() {
                    debug!("标签 {} 为空", name);
                    NOT_AVAILABLE.to_string()
                } else {
                    value.to_string()
                }
            }
            Err(e) => {
                debug!("标签 {} 无法转换为字符串: {}", name, e);
                NOT_AVAILABLE.to_string()
            }
        }
    }

    fn file_size(path: &Path) -> Option<u64> {
        match std::fs::metadata(path) {
            Ok(meta) => Some(meta.len()),
            Err(e) => {
                warn!("Error getting file size for {:?}: {}", path, e);
                None
            }
        }
    }
}
