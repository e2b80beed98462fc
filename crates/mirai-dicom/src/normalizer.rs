//! 像素归一化
//!
//! 解码像素数据 → 可选的VOI窗宽窗位变换 → 按全图最小/最大值线性拉伸到 0..=255。

use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{open_file, DefaultDicomObject, InMemDicomObject};
use dicom::pixeldata::PixelDecoder;
use mirai_core::{MiraiError, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::preview::PreviewRenderer;

/// VOI LUT Function (0028,1056)
const VOI_LUT_FUNCTION: Tag = Tag(0x0028, 0x1056);

/// 窗口变换输出范围
const WINDOW_OUTPUT_MIN: f64 = 0.0;
const WINDOW_OUTPUT_MAX: f64 = 255.0;

/// 解码后的单帧像素矩阵（行优先）
#[derive(Debug, Clone, PartialEq)]
pub struct PixelMatrix {
    pub rows: u32,
    pub columns: u32,
    pub values: Vec<f32>,
}

impl PixelMatrix {
    pub fn new(rows: u32, columns: u32, values: Vec<f32>) -> Result<Self> {
        let expected = rows as usize * columns as usize;
        if expected == 0 || values.len() != expected {
            return Err(MiraiError::Decode(format!(
                "Pixel count does not match dimensions: {}x{} needs {} values, got {}",
                rows,
                columns,
                expected,
                values.len()
            )));
        }
        Ok(Self { rows, columns, values })
    }
}

/// 归一化后的8位灰度帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayFrame {
    pub rows: u32,
    pub columns: u32,
    pub pixels: Vec<u8>,
}

/// VOI LUT 函数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiLutFunction {
    Linear,
    LinearExact,
    Sigmoid,
}

impl VoiLutFunction {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "LINEAR_EXACT" => VoiLutFunction::LinearExact,
            "SIGMOID" => VoiLutFunction::Sigmoid,
            _ => VoiLutFunction::Linear,
        }
    }
}

/// 窗宽窗位
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiWindow {
    pub center: f64,
    pub width: f64,
    pub function: VoiLutFunction,
}

impl VoiWindow {
    pub fn new(center: f64, width: f64, function: VoiLutFunction) -> Self {
        Self { center, width, function }
    }

    /// 窗宽是否可用：LINEAR 要求 >= 1，其余要求 > 0
    pub fn is_valid(&self) -> bool {
        if !self.center.is_finite() || !self.width.is_finite() {
            return false;
        }
        match self.function {
            VoiLutFunction::Linear => self.width >= 1.0,
            VoiLutFunction::LinearExact | VoiLutFunction::Sigmoid => self.width > 0.0,
        }
    }

    /// 对单个值应用窗口变换（PS3.3 C.11.2.1.2）
    pub fn apply(&self, x: f64) -> f64 {
        let (c, w) = (self.center, self.width);
        let range = WINDOW_OUTPUT_MAX - WINDOW_OUTPUT_MIN;
        match self.function {
            VoiLutFunction::Linear => {
                let lower = c - 0.5 - (w - 1.0) / 2.0;
                let upper = c - 0.5 + (w - 1.0) / 2.0;
                if x <= lower {
                    WINDOW_OUTPUT_MIN
                } else if x > upper {
                    WINDOW_OUTPUT_MAX
                } else {
                    ((x - (c - 0.5)) / (w - 1.0) + 0.5) * range + WINDOW_OUTPUT_MIN
                }
            }
            VoiLutFunction::LinearExact => {
                if x <= c - w / 2.0 {
                    WINDOW_OUTPUT_MIN
                } else if x > c + w / 2.0 {
                    WINDOW_OUTPUT_MAX
                } else {
                    ((x - c) / w + 0.5) * range + WINDOW_OUTPUT_MIN
                }
            }
            VoiLutFunction::Sigmoid => range / (1.0 + (-4.0 * (x - c) / w).exp()) + WINDOW_OUTPUT_MIN,
        }
    }

    /// 从数据集读取第一组窗宽窗位
    pub fn from_object(obj: &InMemDicomObject) -> Option<Self> {
        let center = obj.element(tags::WINDOW_CENTER).ok()?.to_float64().ok()?;
        let width = obj.element(tags::WINDOW_WIDTH).ok()?.to_float64().ok()?;
        let function = obj
            .element(VOI_LUT_FUNCTION)
            .ok()
            .and_then(|e| e.to_str().ok().map(|s| VoiLutFunction::parse(&s)))
            .unwrap_or(VoiLutFunction::Linear);

        let window = Self::new(center, width, function);
        if window.is_valid() {
            Some(window)
        } else {
            debug!("忽略无效窗口: center={}, width={}", center, width);
            None
        }
    }
}

/// 影像归一化器
#[derive(Debug, Clone, Default)]
pub struct ImageNormalizer {
    renderer: PreviewRenderer,
}

impl ImageNormalizer {
    pub fn new(renderer: PreviewRenderer) -> Self {
        Self { renderer }
    }

    /// 对像素矩阵应用可选窗口并拉伸到8位
    pub fn normalize(&self, matrix: &PixelMatrix, window: Option<&VoiWindow>) -> Result<GrayFrame> {
        let values: Vec<f32> = match window {
            Some(window) => matrix
                .values
                .iter()
                .map(|&v| window.apply(v as f64) as f32)
                .collect(),
            None => matrix.values.clone(),
        };

        Ok(GrayFrame {
            rows: matrix.rows,
            columns: matrix.columns,
            pixels: rescale_to_u8(&values)?,
        })
    }

    /// 解码存储上的DICOM文件并渲染为PNG预览
    pub fn render_preview<P: AsRef<Path>>(&self, path: P) -> Result<Vec<u8>> {
        let path = path.as_ref();
        let obj = open_file(path)
            .map_err(|e| MiraiError::Decode(format!("Failed to parse DICOM file: {}", e)))?;

        let matrix = decode_frame(&obj)?;
        let window = VoiWindow::from_object(&obj);
        let frame = self.normalize(&matrix, window.as_ref())?;
        let png = self.renderer.render_png(&frame)?;

        info!(
            "Rendered preview for {:?}: {}x{} source, windowed={}",
            path,
            frame.columns,
            frame.rows,
            window.is_some()
        );
        Ok(png)
    }
}

/// 解码第一帧像素；多通道数据按亮度公式合成单通道
pub fn decode_frame(obj: &DefaultDicomObject) -> Result<PixelMatrix> {
    let decoded = obj
        .decode_pixel_data()
        .map_err(|e| MiraiError::Decode(format!("Failed to decode pixel data: {}", e)))?;

    let rows = decoded.rows();
    let columns = decoded.columns();
    let samples = decoded.samples_per_pixel() as usize;

    let raw: Vec<f32> = decoded
        .to_vec_frame::<f32>(0)
        .map_err(|e| MiraiError::Decode(format!("Failed to convert pixel data: {}", e)))?;

    let values = match samples {
        1 => raw,
        3 => raw
            .chunks_exact(3)
            .map(|px| 0.299 * px[0] + 0.587 * px[1] + 0.114 * px[2])
            .collect(),
        other => {
            return Err(MiraiError::Decode(format!("Unsupported samples per pixel: {}", other)));
        }
    };

    PixelMatrix::new(rows, columns, values)
}

/// 线性拉伸：`(v - lo) / (hi - lo) * 255`，四舍五入
///
/// 平坦图像（`hi == lo`）或含非有限值时返回归一化错误。
pub fn rescale_to_u8(values: &[f32]) -> Result<Vec<u8>> {
    if values.is_empty() {
        return Err(MiraiError::Normalization("Pixel data is empty".to_string()));
    }

    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for &v in values {
        if !v.is_finite() {
            return Err(MiraiError::Normalization("Pixel data contains non-finite values".to_string()));
        }
        lo = lo.min(v);
        hi = hi.max(v);
    }

    if hi <= lo {
        return Err(MiraiError::Normalization(format!(
            "Degenerate pixel range: min == max == {}",
            lo
        )));
    }

    let span = (hi - lo) as f64;
    Ok(values
        .iter()
        .map(|&v| (((v - lo) as f64 / span) * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect())
}
