//! 测试用DICOM文件构造工具

use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use mirai_core::{MiraiError, Result};
use std::path::Path;

const SECONDARY_CAPTURE_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.7";
const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";

/// 单帧16位灰度测试影像
#[derive(Debug, Clone)]
pub struct SampleDicom {
    pub rows: u16,
    pub columns: u16,
    pub pixels: Vec<u16>,
    pub window: Option<(String, String)>,
    pub extra_tags: Vec<(Tag, VR, String)>,
}

impl SampleDicom {
    pub fn new(rows: u16, columns: u16, pixels: Vec<u16>) -> Self {
        Self {
            rows,
            columns,
            pixels,
            window: None,
            extra_tags: vec![(tags::PATIENT_NAME, VR::PN, "Doe^Jane".to_string())],
        }
    }

    /// 像素值按位置递增的渐变图
    pub fn gradient(rows: u16, columns: u16) -> Self {
        let count = rows as usize * columns as usize;
        let pixels = (0..count).map(|i| (i * 10) as u16).collect();
        Self::new(rows, columns, pixels)
    }

    /// 所有像素相同的平坦图
    pub fn flat(rows: u16, columns: u16, value: u16) -> Self {
        let count = rows as usize * columns as usize;
        Self::new(rows, columns, vec![value; count])
    }

    pub fn with_window(mut self, center: &str, width: &str) -> Self {
        self.window = Some((center.to_string(), width.to_string()));
        self
    }

    pub fn with_tag(mut self, tag: Tag, vr: VR, value: &str) -> Self {
        self.extra_tags.retain(|(t, _, _)| *t != tag);
        self.extra_tags.push((tag, vr, value.to_string()));
        self
    }

    fn to_object(&self) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from(SECONDARY_CAPTURE_IMAGE_STORAGE)));
        obj.put(DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from("1.2.826.0.1.3680043.9.7382.1")));
        obj.put(DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)));
        obj.put(DataElement::new(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, PrimitiveValue::from("MONOCHROME2")));
        obj.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(self.rows)));
        obj.put(DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(self.columns)));
        obj.put(DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16)));
        obj.put(DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16)));
        obj.put(DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16)));
        obj.put(DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)));

        if let Some((center, width)) = &self.window {
            obj.put(DataElement::new(tags::WINDOW_CENTER, VR::DS, PrimitiveValue::from(center.as_str())));
            obj.put(DataElement::new(tags::WINDOW_WIDTH, VR::DS, PrimitiveValue::from(width.as_str())));
        }

        for (tag, vr, value) in &self.extra_tags {
            obj.put(DataElement::new(*tag, *vr, PrimitiveValue::from(value.as_str())));
        }

        obj.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::U16(self.pixels.iter().copied().collect()),
        ));
        obj
    }
}

/// 写出一个完整的DICOM文件（含文件元信息）
pub fn write_sample_dicom(path: &Path, sample: &SampleDicom) -> Result<()> {
    let data = sample_dicom_bytes(sample)?;
    std::fs::write(path, data)?;
    Ok(())
}

/// 以字节形式返回DICOM文件内容
pub fn sample_dicom_bytes(sample: &SampleDicom) -> Result<Vec<u8>> {
    let meta = FileMetaTableBuilder::new()
        .media_storage_sop_class_uid(SECONDARY_CAPTURE_IMAGE_STORAGE)
        .media_storage_sop_instance_uid("1.2.826.0.1.3680043.9.7382.1")
        .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN);

    let file_obj = sample
        .to_object()
        .with_meta(meta)
        .map_err(|e| MiraiError::Internal(format!("Failed to build file meta table: {}", e)))?;

    let mut data = Vec::new();
    file_obj
        .write_all(&mut data)
        .map_err(|e| MiraiError::Storage(format!("Failed to write DICOM file: {}", e)))?;
    Ok(data)
}
