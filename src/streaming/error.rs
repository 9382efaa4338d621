//! 审计流错误类型
//!
//! 定义一次审计运行可能以之结束的各类失败。
//! 格式错误的行不属于这里：解码器在本地吞掉并计数，不会到达调用方。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 流结束但没有收到 `final` 事件时的固定消息
pub const MISSING_FINAL_MESSAGE: &str = "Audit stream ended without a final result";

/// 审计流错误
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum AuditStreamError {
    /// HTTP 状态码非成功，或响应没有 body
    #[error("{message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// 内部超时触发
    #[error("Audit timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// 协议错误（例如流结束时没有终止事件）
    #[error("{0}")]
    Protocol(String),

    /// 服务端通过 `error` 事件报告的错误，消息原样透传
    #[error("{0}")]
    ServerReported(String),

    /// 其他网络错误
    #[error("Network error: {0}")]
    Network(String),

    /// 单行数据超过缓冲区上限
    #[error("Audit stream line exceeded {limit} bytes")]
    BufferOverflow { limit: usize },

    /// 调用方主动取消；不是面向用户的失败
    #[error("Audit cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for AuditStreamError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            AuditStreamError::transport(Some(status.as_u16()), err.to_string())
        } else {
            AuditStreamError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AuditStreamError {
    fn from(err: serde_json::Error) -> Self {
        AuditStreamError::Protocol(err.to_string())
    }
}

impl AuditStreamError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        AuditStreamError::Transport {
            status,
            message: message.into(),
        }
    }

    /// 流结束但没有 `final` 事件
    pub fn missing_final() -> Self {
        AuditStreamError::Protocol(MISSING_FINAL_MESSAGE.to_string())
    }

    pub fn server_reported(message: impl Into<String>) -> Self {
        AuditStreamError::ServerReported(message.into())
    }

    /// 判断是否值得向用户提供重试入口
    ///
    /// 超时、网络错误以及 429/5xx 的传输错误可以重试。
    pub fn is_retryable(&self) -> bool {
        match self {
            AuditStreamError::Timeout { .. } => true,
            AuditStreamError::Network(_) => true,
            AuditStreamError::Transport { status, .. } => {
                matches!(status, Some(s) if *s == 429 || *s >= 500)
            }
            AuditStreamError::Protocol(_) => false,
            AuditStreamError::ServerReported(_) => false,
            AuditStreamError::BufferOverflow { .. } => false,
            AuditStreamError::Cancelled => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AuditStreamError::Cancelled)
    }

    /// 获取 HTTP 状态码（如果适用）
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AuditStreamError::Transport { status, .. } => *status,
            AuditStreamError::Timeout { .. } => Some(504),
            AuditStreamError::Network(_) => Some(502),
            _ => None,
        }
    }

    /// 稳定的错误类型标识，用于日志与前端分支
    pub fn error_type(&self) -> &'static str {
        match self {
            AuditStreamError::Transport { .. } => "transport_error",
            AuditStreamError::Timeout { .. } => "timeout",
            AuditStreamError::Protocol(_) => "protocol_error",
            AuditStreamError::ServerReported(_) => "server_error",
            AuditStreamError::Network(_) => "network_error",
            AuditStreamError::BufferOverflow { .. } => "buffer_overflow",
            AuditStreamError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            AuditStreamError::Timeout { seconds: 60 }.to_string(),
            "Audit timed out after 60 seconds"
        );
        assert_eq!(
            AuditStreamError::server_reported("boom").to_string(),
            "boom"
        );
        assert_eq!(
            AuditStreamError::missing_final().to_string(),
            MISSING_FINAL_MESSAGE
        );
        assert_eq!(
            AuditStreamError::transport(Some(500), "HTTP 500").to_string(),
            "HTTP 500"
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(AuditStreamError::Timeout { seconds: 60 }.is_retryable());
        assert!(AuditStreamError::Network("reset".into()).is_retryable());
        assert!(AuditStreamError::transport(Some(503), "unavailable").is_retryable());
        assert!(AuditStreamError::transport(Some(429), "slow down").is_retryable());
        assert!(!AuditStreamError::transport(Some(401), "unauthorized").is_retryable());
        assert!(!AuditStreamError::transport(None, "empty body").is_retryable());
        assert!(!AuditStreamError::server_reported("boom").is_retryable());
        assert!(!AuditStreamError::missing_final().is_retryable());
        assert!(!AuditStreamError::Cancelled.is_retryable());
    }

    #[test]
    fn test_status_code() {
        assert_eq!(AuditStreamError::Timeout { seconds: 1 }.status_code(), Some(504));
        assert_eq!(
            AuditStreamError::transport(Some(404), "missing").status_code(),
            Some(404)
        );
        assert_eq!(AuditStreamError::Cancelled.status_code(), None);
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: AuditStreamError = json_err.into();
        assert!(matches!(err, AuditStreamError::Protocol(_)));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let err = AuditStreamError::transport(Some(500), "internal");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"Transport\""));
        let back: AuditStreamError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
