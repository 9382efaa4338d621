//! 日志初始化
//!
//! 日志写到 stderr，stdout 留给命令行输出的审计结果。

use crate::config::LoggingConfig;
use std::str::FromStr;
use tracing::Level;

/// 解析日志级别，无法识别时回退到 info
pub fn parse_level(level: &str) -> Level {
    Level::from_str(level.trim()).unwrap_or(Level::INFO)
}

/// 初始化全局 tracing subscriber
///
/// 重复调用时返回 false（已有全局 subscriber）。
pub fn init_logging(config: &LoggingConfig) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(parse_level(&config.level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
