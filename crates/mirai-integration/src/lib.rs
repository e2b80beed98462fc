//! # 外部集成模块
//!
//! 与远程影像分析服务的对接：批量发送最近上传的DICOM文件并转发分析结果。

pub mod dispatcher;

pub use dispatcher::{DispatchOutcome, DispatchSettings, RemoteDispatcher};
