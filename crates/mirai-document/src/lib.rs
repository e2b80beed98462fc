//! # 文档处理模块
//!
//! PDF合并与报告摘要页生成。

pub mod fonts;
pub mod merger;
pub mod summary;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use fonts::FontFace;
pub use merger::{page_count, DocumentMerger};
pub use summary::{Color, SummaryPage};
