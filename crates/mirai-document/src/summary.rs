//! 报告摘要页
//!
//! 生成一页US Letter尺寸的PDF：段落居中、按宽度自动换行，由上到下依次排版。

use chrono::{DateTime, Local};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, StringFormat};
use mirai_core::{MiraiError, Result, RiskAssessment};
use tracing::debug;

use crate::fonts::{encode_win_ansi, FontFace};

pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;
pub const MARGIN: f32 = 72.0;

const REPORT_TITLE: &str = "Reporte de Análisis DICOM";
const DISCLAIMER: &str = "Este informe ha sido generado automáticamente basándose en los resultados del procesamiento de las imágenes DICOM.";

/// RGB颜色，分量范围 0..=1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color(pub f32, pub f32, pub f32);

impl Color {
    pub const BLACK: Color = Color(0.0, 0.0, 0.0);
    pub const BLUE: Color = Color(0.0, 0.0, 1.0);
    pub const RED: Color = Color(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color(0.0, 0.5, 0.0);
}

/// 同一字体和颜色的一段文本
#[derive(Debug, Clone)]
pub struct Span {
    pub text: String,
    pub font: FontFace,
    pub color: Color,
}

impl Span {
    pub fn new(text: impl Into<String>, font: FontFace, color: Color) -> Self {
        Self {
            text: text.into(),
            font,
            color,
        }
    }
}

/// 居中段落
#[derive(Debug, Clone)]
pub struct Paragraph {
    pub spans: Vec<Span>,
    pub size: f32,
    pub leading: f32,
    pub space_after: f32,
}

/// 排版后的一行
#[derive(Debug, Clone)]
pub struct PlacedLine {
    pub x: f32,
    pub baseline: f32,
    pub size: f32,
    pub width: f32,
    pub runs: Vec<Span>,
}

impl PlacedLine {
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

#[derive(Debug, Clone)]
struct Word {
    text: String,
    font: FontFace,
    color: Color,
    space_before: bool,
}

/// 摘要页内容
#[derive(Debug, Clone)]
pub struct SummaryPage {
    paragraphs: Vec<Paragraph>,
}

impl SummaryPage {
    /// 按风险评估结果构建摘要页
    pub fn new(assessment: &RiskAssessment, study_name: &str, generated_at: DateTime<Local>) -> Self {
        let label_color = if assessment.is_high_risk() {
            Color::RED
        } else {
            Color::GREEN
        };

        let paragraphs = vec![
            Paragraph {
                spans: vec![Span::new(REPORT_TITLE, FontFace::HelveticaBold, Color::BLACK)],
                size: 18.0,
                leading: 21.6,
                space_after: 14.4,
            },
            Paragraph {
                spans: vec![
                    Span::new("Predicción: ", FontFace::Helvetica, Color::BLACK),
                    Span::new(assessment.percentage_text(), FontFace::HelveticaBold, Color::BLUE),
                ],
                size: 18.0,
                leading: 22.0,
                space_after: 14.4,
            },
            Paragraph {
                spans: vec![Span::new(assessment.label.clone(), FontFace::HelveticaBold, label_color)],
                size: 24.0,
                leading: 30.0,
                space_after: 36.0,
            },
            Paragraph {
                spans: vec![Span::new(DISCLAIMER, FontFace::Helvetica, Color::BLACK)],
                size: 10.0,
                leading: 12.0,
                space_after: 14.4,
            },
            Paragraph {
                spans: vec![Span::new(
                    format!("Estudio original: {}", study_name),
                    FontFace::Helvetica,
                    Color::BLACK,
                )],
                size: 10.0,
                leading: 12.0,
                space_after: 14.4,
            },
            Paragraph {
                spans: vec![Span::new(
                    format!(
                        "Fecha de generación del reporte: {}",
                        generated_at.format("%Y-%m-%d %H:%M:%S")
                    ),
                    FontFace::Helvetica,
                    Color::BLACK,
                )],
                size: 10.0,
                leading: 12.0,
                space_after: 0.0,
            },
        ];

        Self { paragraphs }
    }

    /// 计算每一行的位置
    pub fn layout(&self) -> Vec<PlacedLine> {
        let frame_width = PAGE_WIDTH - 2.0 * MARGIN;
        let mut cursor = PAGE_HEIGHT - MARGIN;
        let mut placed = Vec::new();

        for paragraph in &self.paragraphs {
            for runs in wrap(paragraph, frame_width) {
                let width = line_width(&runs, paragraph.size);
                cursor -= paragraph.leading;
                placed.push(PlacedLine {
                    x: ((PAGE_WIDTH - width) / 2.0).max(MARGIN),
                    baseline: cursor + (paragraph.leading - paragraph.size),
                    size: paragraph.size,
                    width,
                    runs,
                });
            }
            cursor -= paragraph.space_after;
        }

        placed
    }

    /// 页面内容流的绘制指令
    pub fn operations(&self) -> Vec<Operation> {
        let mut ops = Vec::new();
        for line in self.layout() {
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new("Td", vec![line.x.into(), line.baseline.into()]));

            let mut current_font = None;
            let mut current_color = None;
            for run in &line.runs {
                if current_font != Some(run.font) {
                    ops.push(Operation::new(
                        "Tf",
                        vec![run.font.resource_name().into(), line.size.into()],
                    ));
                    current_font = Some(run.font);
                }
                if current_color != Some(run.color) {
                    let Color(r, g, b) = run.color;
                    ops.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
                    current_color = Some(run.color);
                }
                ops.push(Operation::new(
                    "Tj",
                    vec![Object::String(encode_win_ansi(&run.text), StringFormat::Literal)],
                ));
            }

            ops.push(Operation::new("ET", vec![]));
        }
        ops
    }

    /// 生成单页PDF
    pub fn render(&self) -> Result<Vec<u8>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut fonts = lopdf::Dictionary::new();
        for face in FontFace::ALL {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => face.base_font(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(face.resource_name(), font_id);
        }
        let resources_id = doc.add_object(dictionary! {
            "Font" => fonts,
        });

        let content = Content {
            operations: self.operations(),
        };
        let encoded = content
            .encode()
            .map_err(|e| MiraiError::Internal(format!("Failed to encode summary page content: {}", e)))?;
        let content_id = doc.add_object(lopdf::Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| MiraiError::Internal(format!("Failed to write summary page: {}", e)))?;
        debug!("摘要页生成完成: {} bytes", buffer.len());
        Ok(buffer)
    }
}

fn line_width(runs: &[Span], size: f32) -> f32 {
    runs.iter().map(|r| r.font.text_width(&r.text, size)).sum()
}

fn split_words(paragraph: &Paragraph) -> Vec<Word> {
    let mut words = Vec::new();
    let mut space_before = false;

    for span in &paragraph.spans {
        let mut current = String::new();
        for c in span.text.chars() {
            if c.is_whitespace() {
                if !current.is_empty() {
                    words.push(Word {
                        text: std::mem::take(&mut current),
                        font: span.font,
                        color: span.color,
                        space_before,
                    });
                }
                space_before = true;
            } else {
                current.push(c);
            }
        }
        // 片段末尾没有空白时与下一个片段直接相连
        if !current.is_empty() {
            words.push(Word {
                text: current,
                font: span.font,
                color: span.color,
                space_before,
            });
            space_before = false;
        }
    }

    words
}

/// 贪心换行，每行由若干同样式片段组成
fn wrap(paragraph: &Paragraph, max_width: f32) -> Vec<Vec<Span>> {
    let mut lines: Vec<Vec<Span>> = Vec::new();
    let mut line: Vec<Span> = Vec::new();
    let mut width = 0.0f32;

    for word in split_words(paragraph) {
        let word_width = word.font.text_width(&word.text, paragraph.size);
        let space_width = if word.space_before && !line.is_empty() {
            word.font.text_width(" ", paragraph.size)
        } else {
            0.0
        };

        if !line.is_empty() && width + space_width + word_width > max_width {
            lines.push(std::mem::take(&mut line));
            width = 0.0;
        }

        let text = if word.space_before && !line.is_empty() {
            format!(" {}", word.text)
        } else {
            word.text.clone()
        };
        width += if line.is_empty() { word_width } else { space_width + word_width };

        match line.last_mut() {
            Some(last) if last.font == word.font && last.color == word.color => last.text.push_str(&text),
            _ => line.push(Span::new(text, word.font, word.color)),
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }
    lines
}
