//! 预览图渲染
//!
//! 8位灰度帧 → PNG。无坐标轴、无边距，长边缩放到固定尺寸（4英寸 × 100 DPI）。

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat};
use mirai_core::{MiraiError, Result};
use std::io::Cursor;

use crate::normalizer::GrayFrame;

/// 预览图长边像素数
pub const DEFAULT_PREVIEW_SIZE: u32 = 400;

/// PNG预览渲染器
#[derive(Debug, Clone)]
pub struct PreviewRenderer {
    max_side: u32,
}

impl Default for PreviewRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_SIZE)
    }
}

impl PreviewRenderer {
    pub fn new(max_side: u32) -> Self {
        Self {
            max_side: max_side.max(1),
        }
    }

    /// 保持宽高比，长边等于 `max_side`
    pub fn target_size(&self, columns: u32, rows: u32) -> (u32, u32) {
        let longest = columns.max(rows).max(1) as f64;
        let scale = self.max_side as f64 / longest;
        let width = ((columns as f64 * scale).round() as u32).clamp(1, self.max_side);
        let height = ((rows as f64 * scale).round() as u32).clamp(1, self.max_side);
        (width, height)
    }

    /// 渲染为PNG字节
    pub fn render_png(&self, frame: &GrayFrame) -> Result<Vec<u8>> {
        let image = GrayImage::from_raw(frame.columns, frame.rows, frame.pixels.clone()).ok_or_else(|| {
            MiraiError::Normalization(format!(
                "Pixel buffer does not match dimensions: {}x{}",
                frame.columns, frame.rows
            ))
        })?;

        let (width, height) = self.target_size(frame.columns, frame.rows);
        let scaled = if (width, height) == (frame.columns, frame.rows) {
            image
        } else {
            let filter = if width < frame.columns {
                FilterType::Triangle
            } else {
                FilterType::Nearest
            };
            imageops::resize(&image, width, height, filter)
        };

        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(scaled)
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| MiraiError::Normalization(format!("PNG encoding failed: {}", e)))?;
        Ok(buffer.into_inner())
    }
}
