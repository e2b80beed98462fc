//! # 数据库模块
//!
//! 保存上传的PDF文档对记录，提供SQLite连接池和仓储接口。

pub mod connection;
pub mod models;
pub mod repository;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use models::*;
pub use repository::{SqliteStudyRepository, StudyRepository};
