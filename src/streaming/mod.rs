//! 审计流核心模块
//!
//! 从审计服务读取换行分隔的 JSON 事件流，增量聚合为审计结果。
//!
//! # 主要组件
//!
//! - `transport`: 发起请求并产出原始字节流
//! - `cancel`: 调用方取消与请求超时的合并
//! - `decoder`: 字节流到事件的增量解码
//! - `aggregator`: 事件到审计结果的状态机
//! - `runner`: 串联以上组件的运行入口
//! - `sessions`: 按品牌登记运行，新运行取代旧运行

pub mod aggregator;
pub mod cancel;
pub mod decoder;
pub mod error;
pub mod events;
pub mod metrics;
pub mod runner;
pub mod sessions;
pub mod transport;

// 重新导出核心类型
pub use aggregator::{
    reduce_draft, AggregatorState, AggregatorStep, AuditAggregator, BucketProgress,
    ProgressCounters, ProgressSnapshot, CONTENT_DEPTH_TEST, DEFAULT_DEDUP_ANALYZER,
};
pub use cancel::{CancelReason, CompositeCancellation};
pub use decoder::{decode, decode_line, DecodedEventStream, LineOutcome, NdjsonEventDecoder};
pub use error::{AuditStreamError, MISSING_FINAL_MESSAGE};
pub use events::{AuditEvent, ProgressBucket, ProgressEvent, ProgressUpdate};
pub use metrics::AuditStreamMetrics;
pub use runner::{AuditOutcome, AuditStreamClient, AuditUpdate};
pub use sessions::{AuditSession, AuditSessionRegistry};
pub use transport::{
    error_message, open_stream, AuditStreamRequest, AuditTransport, ByteStream, HttpAuditTransport,
};
