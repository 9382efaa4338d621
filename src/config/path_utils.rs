//! 配置路径解析

use std::path::{Path, PathBuf};

/// 默认配置文件位置
pub const DEFAULT_CONFIG_PATH: &str = "~/.audit-stream/config.yaml";

/// 环境变量：覆盖配置文件位置
pub const CONFIG_PATH_ENV: &str = "AUDIT_STREAM_CONFIG";

/// 展开开头的 `~` 为用户主目录
///
/// `~user/...` 形式不支持，原样返回；无法获取主目录时同样原样返回。
pub fn expand_tilde<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();

    if !path_str.starts_with('~') {
        return path.to_path_buf();
    }

    let Some(home_dir) = dirs::home_dir() else {
        return path.to_path_buf();
    };

    if path_str == "~" {
        home_dir
    } else if let Some(rest) = path_str.strip_prefix("~/") {
        home_dir.join(rest)
    } else {
        path.to_path_buf()
    }
}

/// 决定使用哪个配置文件，未指定时使用默认位置
pub fn resolve_config_path(explicit: Option<&str>) -> PathBuf {
    let raw = explicit
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_CONFIG_PATH);
    expand_tilde(raw)
}
