//! # 存储模块
//!
//! 负责上传文件、预览图、PDF归档和报告的落盘管理。

pub mod storage;

pub use storage::*;
