//! 就绪度审计流客户端
//!
//! 向审计服务发起一次流式审计，边接收事件边聚合出部分结果，
//! 最终以服务端的权威结果结束。

pub mod config;
pub mod models;
pub mod streaming;
pub mod telemetry;

pub use config::{load_config, AuditConfig, ClientConfig, ConfigError, LoggingConfig};
pub use models::{AuditCategoryKey, AuditResult, FinalAuditResult};
pub use streaming::{
    AuditOutcome, AuditSessionRegistry, AuditStreamClient, AuditStreamError, AuditStreamRequest,
    AuditUpdate,
};
