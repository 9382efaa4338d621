//! 配置管理模块
//!
//! 提供 YAML 配置文件加载、默认值与校验

mod path_utils;
mod types;
mod yaml;

pub use path_utils::{expand_tilde, resolve_config_path, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
pub use types::{AuditConfig, ClientConfig, LoggingConfig, BRAND_ID_PLACEHOLDER};
pub use yaml::{load_config, ConfigError, ConfigManager};
