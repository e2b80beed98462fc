//! # 工作流模块
//!
//! 串联各组件的业务流程：
//! - 影像批量接收：校验、落盘、元数据提取、预览生成
//! - PDF文档对归档：两个PDF + 一条原子提交的记录
//! - 报告合成：最近的文档对与摘要页合并为一个PDF

pub mod archive;
pub mod ingestion;
pub mod report;

// 重新导出主要类型
pub use archive::DocumentArchive;
pub use ingestion::{BatchOutcome, IngestionGateway};
pub use report::{ReportComposer, REPORT_URL_PREFIX};
