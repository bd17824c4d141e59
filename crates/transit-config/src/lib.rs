pub mod config;
pub mod manager;
pub mod options;

pub use config::{
    AcceptTags, ConfigError, ConfigResult, Credentials, Endpoint, FileConfig, LogLevel,
    LoggingConfig, SessionConfig, WILDCARD_TAG,
};
pub use manager::ConfigManager;
pub use options::{AcceptsOption, SessionOptions};

use std::path::PathBuf;

/// 获取 Transit 配置目录路径
pub fn transit_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".transit"))
}

/// 获取默认配置文件路径
pub fn default_config_path() -> Option<PathBuf> {
    transit_dir().map(|dir| dir.join("config.json"))
}

/// 展开路径中的 ~ 为用户主目录
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(path)),
    }
}
