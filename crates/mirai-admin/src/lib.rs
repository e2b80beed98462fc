//! # Mirai管理模块
//!
//! 提供配置加载、验证以及日志初始化等运维功能

pub mod config;
pub mod logging;

pub use config::{
    ConfigValidator, DatabaseConfig, DispatchConfig, LoggingConfig, MiraiConfig, ServerConfig,
    StorageConfig,
};
pub use logging::{init_logging, LogFormat};
