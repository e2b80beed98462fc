//! 配置管理
//!
//! 启动时构建一次完整配置，再按需注入各组件；不使用任何全局可变状态。
//! 加载顺序：内置默认值 → 可选配置文件 → `MIRAI_` 前缀的环境变量。

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

/// 系统完整配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiraiConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 存储配置
    pub storage: StorageConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 远程分析服务配置
    pub dispatch: DispatchConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 单个请求体上限（字节）
    pub max_body_bytes: usize,
}

/// 存储配置：四个存储区
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 原始DICOM上传目录
    pub uploads_dir: PathBuf,
    /// 预览图目录
    pub previews_dir: PathBuf,
    /// 归档PDF目录
    pub archives_dir: PathBuf,
    /// 生成报告目录
    pub reports_dir: PathBuf,
}

/// 数据库配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 连接字符串
    pub url: String,
    /// 最大连接数
    pub max_connections: u32,
}

/// 远程分析服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// 目标端点
    pub endpoint: String,
    /// 每批文件数
    pub batch_size: usize,
    /// 连接超时（秒）
    pub connect_timeout_secs: u64,
    /// 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 最大重试次数
    pub max_retries: u32,
    /// 重试退避基数（毫秒）
    pub retry_backoff_ms: u64,
}

impl DispatchConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别或过滤表达式
    pub level: String,
    /// 输出格式：compact / pretty / full
    pub format: String,
}

impl MiraiConfig {
    /// 加载配置并验证
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&MiraiConfig::default()).context("Failed to seed default configuration")?,
        );

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("MIRAI")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: MiraiConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        ConfigValidator::new().validate(&config)?;

        match config_path {
            Some(path) => info!("Configuration loaded successfully from: {}", path),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&MiraiConfig) -> Result<()>,
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "server.port",
                validator: |config| {
                    if config.server.port == 0 {
                        Err(anyhow::anyhow!("Server port cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "server.max_body_bytes",
                validator: |config| {
                    if config.server.max_body_bytes == 0 {
                        Err(anyhow::anyhow!("Request body limit cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "database.max_connections",
                validator: |config| {
                    if config.database.max_connections == 0 {
                        Err(anyhow::anyhow!("Database max connections cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "dispatch.batch_size",
                validator: |config| {
                    if config.dispatch.batch_size == 0 {
                        Err(anyhow::anyhow!("Dispatch batch size cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "dispatch.endpoint",
                validator: |config| {
                    let endpoint = &config.dispatch.endpoint;
                    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!("Dispatch endpoint must be an http(s) URL: {}", endpoint))
                    }
                },
            },
            ValidationRule {
                field_path: "dispatch.request_timeout_secs",
                validator: |config| {
                    if config.dispatch.request_timeout_secs == 0 {
                        Err(anyhow::anyhow!("Dispatch request timeout cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &MiraiConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("Invalid {}: {}", rule.field_path, e));
            }
        }

        info!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for MiraiConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            database: DatabaseConfig::default(),
            dispatch: DispatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 150 * 1024 * 1024, // 150MB
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("./data/dicom_uploads"),
            previews_dir: PathBuf::from("./data/previews"),
            archives_dir: PathBuf::from("./data/archives"),
            reports_dir: PathBuf::from("./data/reports"),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/mirai.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000/dicom/files".to_string(),
            batch_size: 4,
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_pass_validation() {
        let config = MiraiConfig::default();
        assert!(ConfigValidator::new().validate(&config).is_ok());
        assert_eq!(config.dispatch.batch_size, 4);
        assert_eq!(config.server.max_body_bytes, 150 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let validator = ConfigValidator::new();

        let mut config = MiraiConfig::default();
        config.server.port = 0;
        assert!(validator.validate(&config).is_err());

        let mut config = MiraiConfig::default();
        config.dispatch.batch_size = 0;
        assert!(validator.validate(&config).is_err());

        let mut config = MiraiConfig::default();
        config.dispatch.endpoint = "ftp://example.com".to_string();
        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_load_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 9100\n\n[dispatch]\nendpoint = \"http://analysis.local/dicom/files\"\nbatch_size = 2\n"
        )
        .unwrap();

        let config = MiraiConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.dispatch.batch_size, 2);
        assert_eq!(config.dispatch.endpoint, "http://analysis.local/dicom/files");
        // 未覆盖的字段保持默认
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[dispatch]\nbatch_size = 0\n").unwrap();

        assert!(MiraiConfig::load(file.path().to_str()).is_err());
    }
}
