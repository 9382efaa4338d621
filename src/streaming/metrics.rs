//! 审计流指标
//!
//! 记录单次审计运行的传输与解码统计。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 审计流指标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStreamMetrics {
    /// 首字节时间（毫秒）：从发起请求到收到第一个 body chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttfb_ms: Option<u64>,

    /// 收到的 chunk 数量
    pub chunk_count: u32,

    /// 收到的总字节数
    pub total_bytes: usize,

    /// 成功解码的事件数
    pub event_count: u32,

    /// 被丢弃的格式错误行数
    pub malformed_line_count: u32,

    /// 请求发起时刻
    pub start_time: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_chunk_time: Option<DateTime<Utc>>,
}

impl Default for AuditStreamMetrics {
    fn default() -> Self {
        Self {
            ttfb_ms: None,
            chunk_count: 0,
            total_bytes: 0,
            event_count: 0,
            malformed_line_count: 0,
            start_time: Utc::now(),
            end_time: None,
            first_chunk_time: None,
        }
    }
}

impl AuditStreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录收到一个 chunk，首个 chunk 同时记录 TTFB
    pub fn record_chunk(&mut self, bytes: usize) {
        self.chunk_count += 1;
        self.total_bytes += bytes;

        if self.first_chunk_time.is_none() {
            let now = Utc::now();
            self.first_chunk_time = Some(now);
            self.ttfb_ms = Some((now - self.start_time).num_milliseconds().max(0) as u64);
        }
    }

    pub fn record_events(&mut self, count: usize) {
        self.event_count += count as u32;
    }

    pub fn set_malformed_lines(&mut self, count: u32) {
        self.malformed_line_count = count;
    }

    pub fn finish(&mut self) {
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// 总耗时（毫秒）；未结束时计算到当前时间
    pub fn duration_ms(&self) -> u64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds().max(0) as u64
    }

    /// 输出一行汇总日志
    pub fn log_metrics(&self, brand_id: &str) {
        info!(
            brand_id = %brand_id,
            chunks = self.chunk_count,
            bytes = self.total_bytes,
            events = self.event_count,
            malformed_lines = self.malformed_line_count,
            ttfb_ms = ?self.ttfb_ms,
            duration_ms = self.duration_ms(),
            "审计流指标"
        );
    }
}
