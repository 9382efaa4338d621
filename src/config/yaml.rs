//! YAML 配置加载
//!
//! 配置文件不存在时使用默认值；存在时解析并校验。

use crate::config::path_utils::expand_tilde;
use crate::config::types::AuditConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("解析配置失败: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("配置校验失败: {0}")]
    Validation(String),
}

/// 配置管理器
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
    config: AuditConfig,
}

impl ConfigManager {
    /// 从文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = expand_tilde(path);
        let config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config = Self::parse_yaml(&content)?;
            info!(path = %path.display(), "已加载配置文件");
            config
        } else {
            debug!(path = %path.display(), "配置文件不存在，使用默认配置");
            AuditConfig::default()
        };
        Ok(Self { path, config })
    }

    /// 解析并校验 YAML 文本
    pub fn parse_yaml(content: &str) -> Result<AuditConfig, ConfigError> {
        if content.trim().is_empty() {
            return Ok(AuditConfig::default());
        }
        let config: AuditConfig = serde_yaml::from_str(content)?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn to_yaml(config: &AuditConfig) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(config)?)
    }

    pub fn validate(config: &AuditConfig) -> Result<(), ConfigError> {
        let client = &config.client;
        if client.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "client.timeout_secs 必须大于 0".to_string(),
            ));
        }
        if client.max_line_bytes == 0 {
            return Err(ConfigError::Validation(
                "client.max_line_bytes 必须大于 0".to_string(),
            ));
        }
        url::Url::parse(&client.base_url).map_err(|e| {
            ConfigError::Validation(format!("client.base_url 无效 ({}): {}", client.base_url, e))
        })?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn into_config(self) -> AuditConfig {
        self.config
    }
}

/// 加载配置文件
pub fn load_config(path: impl AsRef<Path>) -> Result<AuditConfig, ConfigError> {
    Ok(ConfigManager::load(path)?.into_config())
}
