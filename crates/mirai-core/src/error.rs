//! 错误定义模块

use thiserror::Error;

/// 系统统一错误类型
#[derive(Error, Debug)]
pub enum MiraiError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("存储错误: {0}")]
    Storage(String),

    /// 影像或PDF载荷无法解析
    #[error("解码错误: {0}")]
    Decode(String),

    /// 像素范围退化或渲染失败
    #[error("归一化错误: {0}")]
    Normalization(String),

    /// 远程分析服务调用失败，`details` 保存对端返回的诊断内容
    #[error("传输错误: {message}")]
    Transport {
        message: String,
        details: Option<String>,
    },

    #[error("持久化错误: {0}")]
    Persistence(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl MiraiError {
    /// 面向调用方的错误消息（不含分类前缀）
    pub fn message(&self) -> String {
        match self {
            MiraiError::Config(msg)
            | MiraiError::Validation(msg)
            | MiraiError::Storage(msg)
            | MiraiError::Decode(msg)
            | MiraiError::Normalization(msg)
            | MiraiError::Persistence(msg)
            | MiraiError::NotFound(msg)
            | MiraiError::Internal(msg) => msg.clone(),
            MiraiError::Transport { message, .. } => message.clone(),
            MiraiError::Io(e) => e.to_string(),
            MiraiError::Serialization(e) => e.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MiraiError::NotFound(_))
    }
}

/// 系统统一结果类型
pub type Result<T> = std::result::Result<T, MiraiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_strips_category() {
        let err = MiraiError::NotFound("Source PDF 1 not found: a.pdf".to_string());
        assert_eq!(err.message(), "Source PDF 1 not found: a.pdf");
        assert!(err.to_string().starts_with("资源未找到"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_transport_message() {
        let err = MiraiError::Transport {
            message: "connection refused".to_string(),
            details: Some("upstream down".to_string()),
        };
        assert_eq!(err.message(), "connection refused");
        assert!(!err.is_not_found());
    }
}
