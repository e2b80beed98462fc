//! # DICOM影像处理模块
//!
//! 提供上传文件校验、头字段元数据提取、像素归一化和PNG预览渲染。

pub mod metadata;
pub mod normalizer;
pub mod preview;
pub mod validator;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use metadata::MetadataExtractor;
pub use normalizer::{GrayFrame, ImageNormalizer, PixelMatrix, VoiLutFunction, VoiWindow};
pub use preview::PreviewRenderer;
pub use validator::{secure_filename, UploadPolicy};
