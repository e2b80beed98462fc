//! # Mirai Web
//!
//! HTTP接口：DICOM上传、PDF归档、报告生成和分析服务转发。

pub mod handlers;
pub mod server;

pub use handlers::ApiError;
pub use server::{create_app, AppState, SharedState, WebServer, DEFAULT_MAX_BODY_BYTES};
