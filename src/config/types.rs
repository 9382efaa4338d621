//! 配置类型定义

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::streaming::aggregator::DEFAULT_DEDUP_ANALYZER;

/// 流路径中的品牌占位符
pub const BRAND_ID_PLACEHOLDER: &str = "{brand_id}";

/// 主配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// 审计流客户端配置
    pub client: ClientConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 审计流客户端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// 审计服务地址
    pub base_url: String,
    /// 流路径，`{brand_id}` 会被替换为 URL 编码后的品牌 ID
    pub stream_path: String,
    /// 等待响应头的超时（秒）
    pub timeout_secs: u64,
    /// 单行最大字节数
    pub max_line_bytes: usize,
    /// 流结束时是否解析没有换行符的最后一行
    pub flush_trailing_line: bool,
    /// semanticStructure 中重复产出 "Content Depth" 的分析器
    pub dedup_analyzer: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            stream_path: default_stream_path(),
            timeout_secs: 60,
            max_line_bytes: 1024 * 1024,
            flush_trailing_line: true,
            dedup_analyzer: DEFAULT_DEDUP_ANALYZER.to_string(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_stream_path() -> String {
    format!("/api/audits/{}/stream", BRAND_ID_PLACEHOLDER)
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_stream_path(mut self, stream_path: impl Into<String>) -> Self {
        self.stream_path = stream_path.into();
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    pub fn with_flush_trailing_line(mut self, flush: bool) -> Self {
        self.flush_trailing_line = flush;
        self
    }

    pub fn with_dedup_analyzer(mut self, analyzer: impl Into<String>) -> Self {
        self.dedup_analyzer = analyzer.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 某个品牌的流地址
    pub fn stream_url(&self, brand_id: &str) -> String {
        let path = self
            .stream_path
            .replace(BRAND_ID_PLACEHOLDER, &urlencoding::encode(brand_id));
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别：trace / debug / info / warn / error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
